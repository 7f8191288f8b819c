use rand::rng;
use rand::seq::SliceRandom;

use practice_core::grouping::{flatten_groups, group_questions};
use practice_core::model::{
    InteractionMode, QuestionGroup, SessionFilters, SessionQuestion, SourceId, SourceQuestion,
    XpRules,
};

/// Selection result for a session build.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub questions: Vec<SessionQuestion>,
    pub groups: Vec<QuestionGroup>,
    /// Questions that passed the difficulty filter.
    pub eligible: usize,
}

impl SessionPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Builds the question list of a new session from upstream candidates.
pub struct SessionPlanBuilder<'a> {
    source_id: &'a SourceId,
    mode: InteractionMode,
    rules: &'a XpRules,
    filters: &'a SessionFilters,
    shuffle: bool,
}

impl<'a> SessionPlanBuilder<'a> {
    #[must_use]
    pub fn new(
        source_id: &'a SourceId,
        mode: InteractionMode,
        rules: &'a XpRules,
        filters: &'a SessionFilters,
    ) -> Self {
        Self {
            source_id,
            mode,
            rules,
            filters,
            shuffle: true,
        }
    }

    /// Disable shuffling to make count-limited selection take the first items.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Adapt, filter by difficulty, group, then sample down to `filters.count`
    /// questions.
    ///
    /// The difficulty filter applies to every question, so a sub-question
    /// whose parent was filtered out becomes standalone. Groups are taken
    /// whole while they fit in the count; the remainder is filled by cutting
    /// one more group short after its parent.
    #[must_use]
    pub fn build(self, candidates: impl IntoIterator<Item = SourceQuestion>) -> SessionPlan {
        let adapted: Vec<SessionQuestion> = candidates
            .into_iter()
            .map(|q| q.to_session_question(self.source_id, self.mode, self.rules))
            .filter(|q| {
                self.filters
                    .difficulty
                    .is_none_or(|wanted| q.difficulty == wanted)
            })
            .collect();
        let eligible = adapted.len();

        let (ordered, groups) = group_questions(adapted);
        if groups.is_empty() {
            return SessionPlan {
                questions: self.sample(ordered),
                groups: Vec::new(),
                eligible,
            };
        }

        let kept = self.sample_groups(groups);
        let questions = flatten_groups(&kept, ordered);
        SessionPlan {
            questions,
            groups: kept,
            eligible,
        }
    }

    fn count(&self) -> Option<usize> {
        self.filters
            .count
            .map(|count| usize::try_from(count).unwrap_or(usize::MAX))
    }

    /// Shuffle only when the pool is larger than the requested count;
    /// otherwise the pool is returned as is.
    fn sample<T>(&self, mut pool: Vec<T>) -> Vec<T> {
        let Some(count) = self.count() else {
            return pool;
        };
        if pool.len() <= count {
            return pool;
        }
        self.shuffle_pool(&mut pool);
        pool.truncate(count);
        pool
    }

    fn sample_groups(&self, mut pool: Vec<QuestionGroup>) -> Vec<QuestionGroup> {
        let Some(count) = self.count() else {
            return pool;
        };
        if pool.iter().map(QuestionGroup::len).sum::<usize>() <= count {
            return pool;
        }
        self.shuffle_pool(&mut pool);

        let mut budget: Vec<Option<usize>> = vec![None; pool.len()];
        let mut remaining = count;
        for (slot, group) in budget.iter_mut().zip(&pool) {
            if group.len() <= remaining {
                *slot = Some(group.len());
                remaining -= group.len();
            }
        }
        if remaining > 0 {
            if let Some(slot) = budget.iter_mut().find(|slot| slot.is_none()) {
                *slot = Some(remaining);
            }
        }

        pool.into_iter()
            .zip(budget)
            .filter_map(|(mut group, take)| {
                let take = take?;
                group.sub_question_ids.truncate(take.saturating_sub(1));
                Some(group)
            })
            .collect()
    }

    fn shuffle_pool<T>(&self, pool: &mut [T]) {
        if self.shuffle {
            let mut rng = rng();
            pool.shuffle(&mut rng);
        }
    }
}
