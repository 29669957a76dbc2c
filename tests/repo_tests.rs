#![cfg(feature = "inmem-store")]

use agora::models::{NewComment, NewTopic, NewUser};
use agora::repo::inmem::InMemRepo;
use agora::repo::{CommentRepo, RepoError, TopicRepo, UserRepo};
use serial_test::serial;

/// Helper that returns a fresh, empty repository for every test run.
/// The `TempDir` guard must outlive the repo so snapshots land in the
/// isolated directory instead of a recreated one.
fn repo() -> (InMemRepo, tempfile::TempDir) {
    // isolate state: do **not** persist to the default file path
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("AGORA_DATA_DIR", dir.path());
    (InMemRepo::new(), dir)
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.into(),
        username: email.split('@').next().unwrap().into(),
        password_hash: "$argon2id$fake".into(),
    }
}

#[tokio::test]
#[serial]
async fn user_create_lookup_and_email_conflict() {
    let (r, _data_dir) = repo();

    let alice = r.create_user(new_user("alice@x.com")).await.unwrap();
    assert_eq!(alice.username, "alice");

    // duplicate email → conflict
    let err = r.create_user(new_user("alice@x.com")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // lookups
    assert_eq!(r.get_user(alice.id).await.unwrap().email, "alice@x.com");
    assert!(matches!(r.get_user(999).await.unwrap_err(), RepoError::NotFound));
    assert!(r.find_user_by_email("alice@x.com").await.unwrap().is_some());
    assert!(r.find_user_by_email("nobody@x.com").await.unwrap().is_none());

    let bob = r.create_user(new_user("bob@x.com")).await.unwrap();
    let users = r.users_by_ids(&[alice.id, bob.id, 999]).await.unwrap();
    assert_eq!(users.len(), 2);
}

#[tokio::test]
#[serial]
async fn comment_depth_chain_and_ceiling() {
    let (r, _data_dir) = repo();
    let u = r.create_user(new_user("alice@x.com")).await.unwrap();
    let t = r
        .create_topic(NewTopic { title: "T1".into(), content: "body".into(), user_id: u.id })
        .await
        .unwrap();

    let comment = |content: &str, parent_id| NewComment {
        content: content.into(),
        topic_id: t.id,
        user_id: u.id,
        parent_id,
    };

    let c1 = r.create_comment(comment("C1", None)).await.unwrap();
    assert_eq!(c1.depth, 0);
    let c2 = r.create_comment(comment("C2", Some(c1.id))).await.unwrap();
    assert_eq!(c2.depth, 1);
    let c3 = r.create_comment(comment("C3", Some(c2.id))).await.unwrap();
    assert_eq!(c3.depth, 2);

    // replying to a depth-2 comment is the one illegal transition
    let err = r.create_comment(comment("C4", Some(c3.id))).await.unwrap_err();
    assert!(matches!(err, RepoError::DepthExceeded));

    // the rejected comment never persisted
    let all = r.comments_for_topic(t.id).await.unwrap();
    assert_eq!(all.len(), 3);
    for c in &all {
        assert!((0..=2).contains(&c.depth));
    }
}

#[tokio::test]
#[serial]
async fn comment_referential_checks() {
    let (r, _data_dir) = repo();
    let u = r.create_user(new_user("alice@x.com")).await.unwrap();
    let t1 = r
        .create_topic(NewTopic { title: "T1".into(), content: "b".into(), user_id: u.id })
        .await
        .unwrap();
    let t2 = r
        .create_topic(NewTopic { title: "T2".into(), content: "b".into(), user_id: u.id })
        .await
        .unwrap();

    // unknown topic
    let err = r
        .create_comment(NewComment { content: "x".into(), topic_id: 999, user_id: u.id, parent_id: None })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));

    // unknown parent
    let err = r
        .create_comment(NewComment { content: "x".into(), topic_id: t1.id, user_id: u.id, parent_id: Some(999) })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));

    // parent belonging to a different topic is treated as absent
    let c1 = r
        .create_comment(NewComment { content: "on t1".into(), topic_id: t1.id, user_id: u.id, parent_id: None })
        .await
        .unwrap();
    let err = r
        .create_comment(NewComment { content: "x".into(), topic_id: t2.id, user_id: u.id, parent_id: Some(c1.id) })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
#[serial]
async fn comments_come_back_in_stable_chronological_order() {
    let (r, _data_dir) = repo();
    let u = r.create_user(new_user("alice@x.com")).await.unwrap();
    let t = r
        .create_topic(NewTopic { title: "T".into(), content: "b".into(), user_id: u.id })
        .await
        .unwrap();

    let mut ids = Vec::new();
    for i in 0..5 {
        let c = r
            .create_comment(NewComment {
                content: format!("c{i}"),
                topic_id: t.id,
                user_id: u.id,
                parent_id: None,
            })
            .await
            .unwrap();
        ids.push(c.id);
    }

    // insertion order survives even when timestamps collide at the same tick
    let got: Vec<_> = r.comments_for_topic(t.id).await.unwrap().iter().map(|c| c.id).collect();
    assert_eq!(got, ids);
}

#[tokio::test]
#[serial]
async fn topic_listing_queries_for_both_pagination_modes() {
    let (r, _data_dir) = repo();
    let u = r.create_user(new_user("alice@x.com")).await.unwrap();
    let mut ids = Vec::new();
    for i in 0..5 {
        let t = r
            .create_topic(NewTopic { title: format!("T{i}"), content: "b".into(), user_id: u.id })
            .await
            .unwrap();
        ids.push(t.id);
    }

    assert_eq!(r.count_topics().await.unwrap(), 5);

    // offset mode: id descending
    let page = r.list_topics_page(0, 2).await.unwrap();
    assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);
    let page = r.list_topics_page(4, 2).await.unwrap();
    assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[0]]);

    // cursor mode: id ascending from the boundary, fetch limit+1
    let rows = r.list_topics_from(0, 3).await.unwrap();
    assert_eq!(rows.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[0], ids[1], ids[2]]);
    let rows = r.list_topics_from(ids[2], 3).await.unwrap();
    assert_eq!(rows.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[2], ids[3], ids[4]]);
}
