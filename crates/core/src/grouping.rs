//! Parent/sub-question grouping for hierarchical homework sessions.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::model::{QuestionGroup, QuestionId, SessionQuestion};

/// Compare sub-question labels so that embedded numbers sort by value.
///
/// `"2" < "10"`, `"1a" < "1b" < "2"`, `"Q9" < "Q10"`.
#[must_use]
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    let mut left = LabelChunks::new(a);
    let mut right = LabelChunks::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunk(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_chunk(x: &str, y: &str) -> Ordering {
    let x_digits = x.bytes().all(|b| b.is_ascii_digit());
    let y_digits = y.bytes().all(|b| b.is_ascii_digit());
    match (x_digits, y_digits) {
        (true, true) => {
            let xt = x.trim_start_matches('0');
            let yt = y.trim_start_matches('0');
            xt.len()
                .cmp(&yt.len())
                .then_with(|| xt.cmp(yt))
                .then_with(|| x.len().cmp(&y.len()))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.to_lowercase().cmp(&y.to_lowercase()),
    }
}

/// Splits a label into alternating runs of ASCII digits and other characters.
struct LabelChunks<'a> {
    rest: &'a str,
}

impl<'a> LabelChunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for LabelChunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digit)
            .map_or(self.rest.len(), |(i, _)| i);
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

/// Order questions into parent groups and assign explicit ordinals.
///
/// Returns the questions in display order (each parent followed by its
/// sub-questions) and the groups. When no question declares a parent the
/// list is returned in its original order with no groups.
///
/// A question is top-level when it declares no parent, when its declared
/// parent is not in the list, or when its parent chain loops. Nested
/// sub-questions are attached to their top-level ancestor. Siblings are
/// ordered by [`compare_labels`], falling back to input order.
#[must_use]
pub fn group_questions(
    questions: Vec<SessionQuestion>,
) -> (Vec<SessionQuestion>, Vec<QuestionGroup>) {
    let mut questions = questions;
    if questions.iter().all(|q| q.parent_id().is_none()) {
        for (i, q) in questions.iter_mut().enumerate() {
            q.hierarchy.ordinal = u32::try_from(i).unwrap_or(u32::MAX);
        }
        return (questions, Vec::new());
    }

    let position: HashMap<QuestionId, usize> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| (q.id.clone(), i))
        .collect();

    let root_of = |start: usize| -> usize {
        let mut current = start;
        let mut visited = HashSet::new();
        while let Some(parent) = questions[current].parent_id() {
            let Some(&next) = position.get(parent) else {
                return current;
            };
            if !visited.insert(current) {
                return start;
            }
            current = next;
        }
        current
    };

    let roots: Vec<usize> = (0..questions.len()).map(root_of).collect();

    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut root_order = Vec::new();
    for (i, &root) in roots.iter().enumerate() {
        if root == i {
            root_order.push(i);
        } else {
            members.entry(root).or_default().push(i);
        }
    }

    for subs in members.values_mut() {
        subs.sort_by(|&a, &b| {
            let la = questions[a].hierarchy.sub_label.as_deref().unwrap_or("");
            let lb = questions[b].hierarchy.sub_label.as_deref().unwrap_or("");
            compare_labels(la, lb).then(a.cmp(&b))
        });
    }

    let mut slots: Vec<Option<SessionQuestion>> = questions.drain(..).map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    let mut groups = Vec::with_capacity(root_order.len());

    for (group_idx, root) in root_order.into_iter().enumerate() {
        let Some(mut parent) = slots[root].take() else {
            continue;
        };
        // Orphans and loop members are promoted to standalone questions.
        if parent.hierarchy.parent_id.is_some() {
            parent.hierarchy.is_sub_question = false;
            parent.hierarchy.parent_id = None;
        }
        parent.hierarchy.ordinal = u32::try_from(group_idx).unwrap_or(u32::MAX);

        let mut group = QuestionGroup {
            parent_id: parent.id.clone(),
            sub_question_ids: Vec::new(),
        };
        let parent_id = parent.id.clone();
        ordered.push(parent);

        let subs = members.remove(&root).unwrap_or_default();
        for (ordinal, idx) in subs.into_iter().enumerate() {
            let Some(mut sub) = slots[idx].take() else {
                continue;
            };
            sub.hierarchy.is_sub_question = true;
            sub.hierarchy.parent_id = Some(parent_id.clone());
            sub.hierarchy.ordinal = u32::try_from(ordinal + 1).unwrap_or(u32::MAX);
            group.sub_question_ids.push(sub.id.clone());
            ordered.push(sub);
        }
        groups.push(group);
    }

    (ordered, groups)
}

/// Rebuild the display order of `questions` from kept `groups`, dropping
/// questions whose group is not listed.
#[must_use]
pub fn flatten_groups(
    groups: &[QuestionGroup],
    questions: Vec<SessionQuestion>,
) -> Vec<SessionQuestion> {
    let mut by_id: HashMap<QuestionId, SessionQuestion> =
        questions.into_iter().map(|q| (q.id.clone(), q)).collect();
    let mut out = Vec::new();
    for group in groups {
        if let Some(parent) = by_id.remove(&group.parent_id) {
            out.push(parent);
        }
        for id in &group.sub_question_ids {
            if let Some(sub) = by_id.remove(id) {
                out.push(sub);
            }
        }
    }
    out
}
