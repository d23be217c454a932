use memorito_async::{weak_memoize_async, MemoizeError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Repo {
    name: String,
}

#[tokio::test]
async fn test_same_object_shares_computation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let describe = weak_memoize_async(move |repo: &Arc<Repo>| {
        counter.fetch_add(1, Ordering::SeqCst);
        let repo = Arc::clone(repo);
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, MemoizeError>(repo.name.to_uppercase())
        }
    });

    let repo = Arc::new(Repo { name: "core".into() });
    let (a, b) = tokio::join!(
        describe.call(&repo).unwrap(),
        describe.call(&Arc::clone(&repo)).unwrap()
    );

    assert_eq!(a.unwrap(), "CORE");
    assert_eq!(b.unwrap(), "CORE");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(describe.is_empty());
}

#[tokio::test]
async fn test_distinct_objects_run_separately() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let describe = weak_memoize_async(move |repo: &Arc<Repo>| {
        counter.fetch_add(1, Ordering::SeqCst);
        let repo = Arc::clone(repo);
        async move { Ok::<_, MemoizeError>(repo.name.len()) }
    });

    let a = Arc::new(Repo { name: "same".into() });
    let b = Arc::new(Repo { name: "same".into() });
    let fa = describe.call(&a).unwrap();
    let fb = describe.call(&b).unwrap();
    assert_eq!(describe.len(), 2);

    assert_eq!(fa.await.unwrap(), 4);
    assert_eq!(fb.await.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_settled_entry_is_removed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let load = weak_memoize_async(move |_: &Arc<Repo>| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(MemoizeError::Serialization("offline".into()))
            } else {
                Ok(n)
            }
        }
    });

    let repo = Arc::new(Repo { name: "r".into() });
    assert!(load.call(&repo).unwrap().await.is_err());
    assert!(load.is_empty());
    assert_eq!(load.call(&repo).unwrap().await, Ok(1));
}

#[tokio::test]
async fn test_non_object_argument() {
    let load = weak_memoize_async(|repo: &Option<Arc<Repo>>| {
        let present = repo.is_some();
        async move { Ok::<_, MemoizeError>(present) }
    });

    assert!(matches!(
        load.call(&None),
        Err(MemoizeError::InvalidWeakKey { .. })
    ));
    let repo = Some(Arc::new(Repo { name: "r".into() }));
    assert!(load.call(&repo).unwrap().await.unwrap());
}

#[tokio::test]
async fn test_reset_keeps_started_work() {
    let load = weak_memoize_async(|repo: &Arc<Repo>| {
        let repo = Arc::clone(repo);
        async move { Ok::<_, MemoizeError>(repo.name.clone()) }
    });

    let repo = Arc::new(Repo { name: "kept".into() });
    let started = load.call(&repo).unwrap();
    load.reset();
    assert!(load.is_empty());
    assert_eq!(started.await.unwrap(), "kept");
}

#[tokio::test]
async fn test_panicking_computation_is_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let describe = weak_memoize_async(move |repo: &Arc<Repo>| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        let repo = Arc::clone(repo);
        async move {
            if attempt == 0 {
                panic!("index corrupted");
            }
            Ok::<_, MemoizeError>(repo.name.len())
        }
    });

    let repo = Arc::new(Repo { name: "docs".into() });
    assert!(tokio::spawn(describe.call(&repo).unwrap()).await.is_err());
    assert!(describe.is_empty());

    assert_eq!(describe.call(&repo).unwrap().await, Ok(4));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
