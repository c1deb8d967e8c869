use std::collections::HashMap;
use std::slice;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::advice::AdviceService;
use crate::domain::advice::AdviceThread;
use crate::domain::comment::Comment;
use crate::http::ApiError;

/// Reply forest over a flat comment list.
///
/// The forest only indexes into the borrowed slice; nothing is copied or
/// reordered. Siblings keep their relative order from the input. A comment
/// whose parent is missing from the list, or which names itself as parent,
/// is shown as a root, as is the first comment of any parent loop.
#[derive(Debug, Clone)]
pub struct CommentForest<'a> {
    comments: &'a [Comment],
    children: HashMap<Option<Uuid>, Vec<usize>>,
}

impl<'a> CommentForest<'a> {
    pub fn build(comments: &'a [Comment]) -> Self {
        let known: HashMap<Uuid, usize> = comments
            .iter()
            .enumerate()
            .map(|(index, comment)| (comment.id, index))
            .collect();

        let mut children: HashMap<Option<Uuid>, Vec<usize>> = HashMap::new();
        for (index, comment) in comments.iter().enumerate() {
            let parent = comment
                .parent_id
                .filter(|parent| *parent != comment.id && known.contains_key(parent));
            if parent.is_none() && comment.parent_id.is_some() {
                debug!(comment_id = %comment.id, "comment parent not in thread, shown as root");
            }
            children.entry(parent).or_default().push(index);
        }

        // a parent chain that loops back on itself never reaches a root;
        // cut each loop at its first comment in list order
        let mut reached = vec![false; comments.len()];
        let roots = children.get(&None).cloned().unwrap_or_default();
        mark_reachable(comments, &children, roots, &mut reached);
        for index in 0..comments.len() {
            if reached[index] {
                continue;
            }
            let comment = &comments[index];
            debug!(comment_id = %comment.id, "comment parent chain loops, shown as root");
            if let Some(siblings) = children.get_mut(&comment.parent_id) {
                siblings.retain(|sibling| *sibling != index);
            }
            children.entry(None).or_default().push(index);
            mark_reachable(comments, &children, vec![index], &mut reached);
        }

        Self { comments, children }
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &'a Comment> + '_ {
        self.children_of(None)
    }

    pub fn replies(&self, comment_id: Uuid) -> impl Iterator<Item = &'a Comment> + '_ {
        self.children_of(Some(comment_id))
    }

    fn children_of(&self, parent: Option<Uuid>) -> impl Iterator<Item = &'a Comment> + '_ {
        let comments = self.comments;
        self.child_indices(parent)
            .iter()
            .map(move |index| &comments[*index])
    }

    fn child_indices(&self, parent: Option<Uuid>) -> &[usize] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first walk: each comment is followed by all of its replies
    /// before its next sibling. Each call starts a fresh walk.
    pub fn iter(&self) -> Traversal<'_, 'a> {
        Traversal {
            forest: self,
            stack: vec![(self.child_indices(None).iter(), 0)],
        }
    }

    pub fn entries(&self) -> Vec<ThreadEntry<'a>> {
        self.iter().collect()
    }
}

impl<'f, 'a> IntoIterator for &'f CommentForest<'a> {
    type Item = ThreadEntry<'a>;
    type IntoIter = Traversal<'f, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn mark_reachable(
    comments: &[Comment],
    children: &HashMap<Option<Uuid>, Vec<usize>>,
    mut stack: Vec<usize>,
    reached: &mut [bool],
) {
    while let Some(index) = stack.pop() {
        if std::mem::replace(&mut reached[index], true) {
            continue;
        }
        if let Some(replies) = children.get(&Some(comments[index].id)) {
            stack.extend(replies);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadEntry<'a> {
    pub comment: &'a Comment,
    /// 0 for roots.
    pub depth: usize,
}

pub struct Traversal<'f, 'a> {
    forest: &'f CommentForest<'a>,
    stack: Vec<(slice::Iter<'f, usize>, usize)>,
}

impl<'f, 'a> Iterator for Traversal<'f, 'a> {
    type Item = ThreadEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (siblings, depth) = self.stack.last_mut()?;
            let depth = *depth;
            match siblings.next() {
                Some(index) => {
                    let comment = &self.forest.comments[*index];
                    let replies = self.forest.child_indices(Some(comment.id));
                    if !replies.is_empty() {
                        self.stack.push((replies.iter(), depth + 1));
                    }
                    return Some(ThreadEntry { comment, depth });
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Which comment a pending reply attaches under. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyTarget {
    advice_id: Option<Uuid>,
    comment_id: Option<Uuid>,
}

impl ReplyTarget {
    /// Switching to another advice item drops the target.
    pub fn select_advice(&mut self, advice_id: Uuid) {
        if self.advice_id != Some(advice_id) {
            self.advice_id = Some(advice_id);
            self.comment_id = None;
        }
    }

    pub fn reply_to(&mut self, comment_id: Uuid) {
        self.comment_id = Some(comment_id);
    }

    pub fn clear(&mut self) {
        self.comment_id = None;
    }

    pub fn comment_id(&self) -> Option<Uuid> {
        self.comment_id
    }

    pub fn advice_id(&self) -> Option<Uuid> {
        self.advice_id
    }
}

/// Page-level state for one open advice thread.
pub struct ThreadView {
    advice: AdviceService,
    thread: Option<AdviceThread>,
    target: ReplyTarget,
}

impl ThreadView {
    pub fn new(advice: AdviceService) -> Self {
        Self {
            advice,
            thread: None,
            target: ReplyTarget::default(),
        }
    }

    pub fn thread(&self) -> Option<&AdviceThread> {
        self.thread.as_ref()
    }

    pub fn reply_target(&self) -> &ReplyTarget {
        &self.target
    }

    pub fn forest(&self) -> Option<CommentForest<'_>> {
        self.thread
            .as_ref()
            .map(|thread| CommentForest::build(&thread.comments))
    }

    /// Switches to another thread. Nothing changes if the fetch fails, so
    /// the reply target and the shown thread always name the same advice.
    pub async fn open(&mut self, advice_id: Uuid) -> Result<&AdviceThread, ApiError> {
        let thread = self.advice.get_thread(advice_id).await?;
        self.target.select_advice(advice_id);
        Ok(self.thread.insert(thread))
    }

    pub async fn reload(&mut self) -> Result<&AdviceThread, ApiError> {
        let advice_id = self
            .target
            .advice_id()
            .ok_or_else(|| ApiError::validation("no advice thread is open"))?;
        let thread = self.advice.get_thread(advice_id).await?;
        Ok(self.thread.insert(thread))
    }

    pub fn reply_to(&mut self, comment_id: Uuid) -> Result<(), ApiError> {
        let exists = self
            .thread
            .as_ref()
            .is_some_and(|thread| thread.comments.iter().any(|comment| comment.id == comment_id));
        if !exists {
            return Err(ApiError::validation("the comment you are replying to no longer exists"));
        }
        self.target.reply_to(comment_id);
        Ok(())
    }

    pub fn cancel_reply(&mut self) {
        self.target.clear();
    }

    /// Posts under the current reply target. On success the target is
    /// cleared and the thread is fetched again.
    pub async fn post(&mut self, body: &str) -> Result<Comment, ApiError> {
        let thread = self
            .thread
            .as_ref()
            .ok_or_else(|| ApiError::validation("no advice thread is open"))?;
        let comment = self
            .advice
            .post_comment(thread, body, self.target.comment_id())
            .await?;

        self.target.clear();
        if let Err(err) = self.reload().await {
            warn!(advice_id = %comment.advice_id, error = %err, "thread reload after comment failed");
        }
        Ok(comment)
    }
}
