//! Reply forest reconstruction from the flat comment list of one post.

use std::collections::HashMap;

use crate::models::{Comment, CommentId};

pub const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentForest {
    roots: Vec<CommentNode>,
}

impl CommentForest {
    pub fn roots(&self) -> &[CommentNode] {
        &self.roots
    }

    /// Total number of comments across all trees.
    pub fn len(&self) -> usize {
        self.walk().count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of levels in the deepest tree; 0 for an empty forest.
    pub fn max_depth(&self) -> usize {
        self.walk().map(|(depth, _)| depth + 1).max().unwrap_or(0)
    }

    pub fn find(&self, id: CommentId) -> Option<&CommentNode> {
        let mut stack: Vec<&CommentNode> = self.roots.iter().collect();
        while let Some(node) = stack.pop() {
            if node.comment.id == id {
                return Some(node);
            }
            stack.extend(node.replies.iter());
        }
        None
    }

    /// Depth-first, display-order traversal yielding `(depth, comment)` with
    /// roots at depth 0.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: self.roots.iter().rev().map(|node| (0, node)).collect(),
        }
    }
}

pub struct Walk<'a> {
    stack: Vec<(usize, &'a CommentNode)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a Comment);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.replies.iter().rev().map(|child| (depth + 1, child)));
        Some((depth, &node.comment))
    }
}

/// Builds the reply forest. Siblings keep their input order.
///
/// Malformed links never fail: a parent id that is absent from the input or
/// points at the comment itself makes that comment a root, and a parent cycle
/// is cut at the member that appears first in the input. With duplicate ids,
/// replies attach to the first occurrence.
pub fn build_forest(comments: &[Comment]) -> CommentForest {
    let count = comments.len();
    let mut index: HashMap<CommentId, usize> = HashMap::with_capacity(count);
    for (pos, comment) in comments.iter().enumerate() {
        index.entry(comment.id).or_insert(pos);
    }

    let mut parents: Vec<Option<usize>> = comments
        .iter()
        .enumerate()
        .map(|(pos, comment)| {
            comment
                .parent_id
                .and_then(|parent_id| index.get(&parent_id).copied())
                .filter(|&parent| parent != pos)
        })
        .collect();
    break_cycles(&mut parents);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut roots = Vec::new();
    for (pos, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(pos),
            None => roots.push(pos),
        }
    }

    // Assemble bottom-up with an explicit stack; thread depth is unbounded.
    let mut built: Vec<Option<CommentNode>> = (0..count).map(|_| None).collect();
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&pos| (pos, false)).collect();
    while let Some((pos, expanded)) = stack.pop() {
        if expanded {
            let replies = children[pos]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            built[pos] = Some(CommentNode {
                comment: comments[pos].clone(),
                replies,
            });
        } else {
            stack.push((pos, true));
            stack.extend(children[pos].iter().rev().map(|&child| (child, false)));
        }
    }

    CommentForest {
        roots: roots.iter().filter_map(|&pos| built[pos].take()).collect(),
    }
}

/// Stable sort by creation time, for callers that want chronological threads.
pub fn sort_chronologically(comments: &mut [Comment]) {
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

fn break_cycles(parents: &mut [Option<usize>]) {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNSEEN; parents.len()];
    for start in 0..parents.len() {
        if state[start] != UNSEEN {
            continue;
        }
        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(node) = current {
            match state[node] {
                UNSEEN => {
                    state[node] = ON_PATH;
                    path.push(node);
                    current = parents[node];
                }
                ON_PATH => {
                    if let Some(at) = path.iter().position(|&p| p == node) {
                        if let Some(&first) = path[at..].iter().min() {
                            parents[first] = None;
                        }
                    }
                    break;
                }
                _ => break,
            }
        }
        for node in path {
            state[node] = DONE;
        }
    }
}
