//! Atomic rebase behavior against a real git repository.

mod common;

use common::{commit_file, create_test_repo, git};
use stackline::git::GitRepository;
use stackline::stack::{RebaseEngine, RebaseOptions, StackManager};

#[test]
fn test_conflicting_rebase_rolls_back_all_branches() {
    let tmp = create_test_repo();
    let dir = tmp.path();

    // x edits file.txt on top of main; y edits the same line from main, so
    // rebasing y onto x conflicts; z stacks cleanly on y
    commit_file(dir, "file.txt", "base\n");
    git(dir, &["checkout", "-b", "x"]);
    commit_file(dir, "file.txt", "x\n");
    git(dir, &["checkout", "main"]);
    git(dir, &["checkout", "-b", "y"]);
    commit_file(dir, "file.txt", "y\n");
    git(dir, &["checkout", "-b", "z"]);
    commit_file(dir, "z.txt", "z\n");

    let repo = GitRepository::open(dir);
    let manager = StackManager::new(repo.git_dir().unwrap());
    let mut stack = manager.create("demo", "main").unwrap();
    for name in ["x", "y", "z"] {
        manager.append_branch(&mut stack, name).unwrap();
    }

    let x0 = repo.sha("x").unwrap();
    let y0 = repo.sha("y").unwrap();
    let z0 = repo.sha("z").unwrap();
    let before = repo.current_branch().unwrap();
    assert_eq!(before, "z");

    let engine = RebaseEngine::new(&manager, &repo);
    let err = engine.rebase(&mut stack, &RebaseOptions::default());
    assert!(err.is_err(), "conflicting rebase must fail");

    // every branch is back at its pre-operation commit
    assert_eq!(repo.sha("x").unwrap(), x0);
    assert_eq!(repo.sha("y").unwrap(), y0);
    assert_eq!(repo.sha("z").unwrap(), z0);

    // no in-flight rebase, original checkout restored, snapshot gone
    assert!(!repo.rebase_in_progress());
    assert!(repo.is_clean().unwrap());
    assert_eq!(repo.current_branch().unwrap(), before);
    assert!(manager.load("demo").unwrap().snapshot.is_none());
    let yaml =
        std::fs::read_to_string(repo.git_dir().unwrap().join("stacks/demo.yaml")).unwrap();
    assert!(!yaml.contains("snapshot"));
}

#[test]
fn test_rebase_carries_stack_onto_moved_base() {
    let tmp = create_test_repo();
    let dir = tmp.path();

    git(dir, &["checkout", "-b", "a"]);
    commit_file(dir, "a.txt", "a\n");
    git(dir, &["checkout", "-b", "b"]);
    commit_file(dir, "b.txt", "b\n");

    // base advances underneath the stack
    git(dir, &["checkout", "main"]);
    commit_file(dir, "hotfix.txt", "fix\n");
    git(dir, &["checkout", "b"]);

    let repo = GitRepository::open(dir);
    let manager = StackManager::new(repo.git_dir().unwrap());
    let mut stack = manager.create("demo", "main").unwrap();
    for name in ["a", "b"] {
        manager.append_branch(&mut stack, name).unwrap();
    }

    let engine = RebaseEngine::new(&manager, &repo);
    engine.rebase(&mut stack, &RebaseOptions::default()).unwrap();

    assert!(repo.is_ancestor("main", "a"));
    assert!(repo.is_ancestor("a", "b"));
    assert!(manager.load("demo").unwrap().snapshot.is_none());
    assert_eq!(repo.current_branch().unwrap(), "b");
}

#[test]
fn test_partial_range_leaves_other_branches_alone() {
    let tmp = create_test_repo();
    let dir = tmp.path();

    git(dir, &["checkout", "-b", "a"]);
    commit_file(dir, "a.txt", "a\n");
    git(dir, &["checkout", "-b", "b"]);
    commit_file(dir, "b.txt", "b\n");
    git(dir, &["checkout", "main"]);
    commit_file(dir, "hotfix.txt", "fix\n");

    let repo = GitRepository::open(dir);
    let manager = StackManager::new(repo.git_dir().unwrap());
    let mut stack = manager.create("demo", "main").unwrap();
    for name in ["a", "b"] {
        manager.append_branch(&mut stack, name).unwrap();
    }

    let b0 = repo.sha("b").unwrap();
    let engine = RebaseEngine::new(&manager, &repo);
    let opts = RebaseOptions {
        from: Some("a".to_string()),
        to: Some("a".to_string()),
        atomic: true,
    };
    engine.rebase(&mut stack, &opts).unwrap();

    assert!(repo.is_ancestor("main", "a"));
    assert_eq!(repo.sha("b").unwrap(), b0);
}
