//! Comment tree materialization.
//!
//! A topic's comments come back from the store as one flat, chronologically
//! ordered list. Assembly groups them by `parent_id` and walks the index from
//! the roots, so building the full tree costs two store round-trips (comments
//! plus authors) no matter how many nodes it has.

use std::collections::HashMap;

use crate::models::{Comment, CommentNode, Id, User, MAX_COMMENT_DEPTH};
use crate::repo::{Repo, RepoResult};

/// Fetch and assemble the full comment tree for a topic.
pub async fn for_topic(repo: &dyn Repo, topic_id: Id) -> RepoResult<Vec<CommentNode>> {
    let comments = repo.comments_for_topic(topic_id).await?;

    let mut author_ids: Vec<Id> = comments.iter().map(|c| c.user_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let authors: HashMap<Id, User> = repo
        .users_by_ids(&author_ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    Ok(assemble(comments, &authors))
}

/// Build the nested forest from a flat comment list.
///
/// `comments` must already be in sibling order (chronological, ties by id);
/// grouping preserves that order within each parent bucket. A comment whose
/// author is missing from `authors` is an orphaned foreign key: the node and
/// its subtree are omitted and a warning is logged.
pub fn assemble(comments: Vec<Comment>, authors: &HashMap<Id, User>) -> Vec<CommentNode> {
    let mut children: HashMap<Option<Id>, Vec<Comment>> = HashMap::new();
    for c in comments {
        children.entry(c.parent_id).or_default().push(c);
    }
    build_level(&children, None, 0, authors)
}

fn build_level(
    children: &HashMap<Option<Id>, Vec<Comment>>,
    parent: Option<Id>,
    depth: i32,
    authors: &HashMap<Id, User>,
) -> Vec<CommentNode> {
    let Some(siblings) = children.get(&parent) else {
        return Vec::new();
    };
    let mut nodes = Vec::with_capacity(siblings.len());
    for c in siblings {
        let Some(author) = authors.get(&c.user_id) else {
            log::warn!("comment {} references missing user {}; omitting node", c.id, c.user_id);
            continue;
        };
        let replies = if depth < MAX_COMMENT_DEPTH {
            build_level(children, Some(c.id), depth + 1, authors)
        } else {
            Vec::new()
        };
        nodes.push(CommentNode::new(c.clone(), author.clone().into(), replies));
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn user(id: Id) -> User {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        User {
            id,
            email: format!("u{id}@example.com"),
            username: format!("u{id}"),
            password_hash: "x".into(),
            created_at: t,
            updated_at: t,
        }
    }

    fn comment(id: Id, parent_id: Option<Id>, depth: i32, seconds: i64) -> Comment {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds);
        Comment {
            id,
            content: format!("c{id}"),
            topic_id: 1,
            user_id: 1,
            parent_id,
            depth,
            created_at: t,
            updated_at: t,
        }
    }

    fn authors() -> HashMap<Id, User> {
        [(1, user(1))].into_iter().collect()
    }

    #[test]
    fn roots_only() {
        let tree = assemble(
            vec![comment(1, None, 0, 0), comment(2, None, 0, 1)],
            &authors(),
        );
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, 1);
        assert_eq!(tree[1].id, 2);
        assert!(tree[0].replies.is_empty());
    }

    #[test]
    fn nests_to_depth_two_and_caps_there() {
        // chain 1 <- 2 <- 3, plus 4 hanging off 3 (would be depth 3)
        let tree = assemble(
            vec![
                comment(1, None, 0, 0),
                comment(2, Some(1), 1, 1),
                comment(3, Some(2), 2, 2),
                comment(4, Some(3), 3, 3),
            ],
            &authors(),
        );
        assert_eq!(tree.len(), 1);
        let c1 = &tree[0];
        assert_eq!(c1.replies.len(), 1);
        let c2 = &c1.replies[0];
        assert_eq!(c2.replies.len(), 1);
        let c3 = &c2.replies[0];
        // depth ceiling: replies empty even though a child row exists
        assert!(c3.replies.is_empty());
    }

    #[test]
    fn every_comment_appears_exactly_once_under_its_parent() {
        let tree = assemble(
            vec![
                comment(1, None, 0, 0),
                comment(2, None, 0, 1),
                comment(3, Some(1), 1, 2),
                comment(4, Some(2), 1, 3),
                comment(5, Some(1), 1, 4),
            ],
            &authors(),
        );
        assert_eq!(tree.len(), 2);
        let ids: Vec<Id> = tree[0].replies.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 5]);
        assert_eq!(tree[1].replies.len(), 1);
        assert_eq!(tree[1].replies[0].id, 4);
        let total: usize = tree.iter().map(count_nodes).sum();
        assert_eq!(total, 5);
    }

    fn count_nodes(n: &CommentNode) -> usize {
        1 + n.replies.iter().map(count_nodes).sum::<usize>()
    }

    #[test]
    fn sibling_order_is_chronological_with_id_tiebreak() {
        // same timestamp, id decides
        let tree = assemble(
            vec![comment(7, None, 0, 0), comment(9, None, 0, 0), comment(8, None, 0, 0)],
            &authors(),
        );
        // assemble preserves input order; the repo sorts by (created_at, id)
        let pre_sorted = {
            let mut v = vec![comment(9, None, 0, 0), comment(7, None, 0, 0), comment(8, None, 0, 0)];
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            assemble(v, &authors())
        };
        let ids: Vec<Id> = pre_sorted.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![7, 8, 9]);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn missing_author_omits_node_and_subtree() {
        let mut a = authors();
        a.remove(&1);
        a.insert(2, user(2));
        let mut orphan = comment(1, None, 0, 0);
        orphan.user_id = 1; // no such author
        let mut ok = comment(2, None, 0, 1);
        ok.user_id = 2;
        let child = {
            let mut c = comment(3, Some(1), 1, 2);
            c.user_id = 2;
            c
        };
        let tree = assemble(vec![orphan, ok, child], &a);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, 2);
    }
}
