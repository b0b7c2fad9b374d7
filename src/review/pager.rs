//! Cursor-driven walk over one pillar's answers.

use super::{ExternalAnswer, ReviewApi};
use crate::error::{Result, WaReviewError};
use tracing::debug;

/// Pages through `ListAnswers` for one pillar.
///
/// Stops when the service stops returning a cursor (absent or empty). A walk that needs
/// more than `max_pages` round trips, or a service that hands back the cursor it was just
/// given, ends with [`WaReviewError::PaginationLimit`].
pub struct AnswerPager<'a, A: ReviewApi + ?Sized> {
    api: &'a A,
    workload_id: &'a str,
    pillar_id: &'a str,
    max_pages: usize,
    cursor: Option<String>,
    pages: usize,
    exhausted: bool,
    stalled: bool,
}

impl<'a, A: ReviewApi + ?Sized> AnswerPager<'a, A> {
    pub fn new(api: &'a A, workload_id: &'a str, pillar_id: &'a str, max_pages: usize) -> Self {
        Self {
            api,
            workload_id,
            pillar_id,
            max_pages,
            cursor: None,
            pages: 0,
            exhausted: false,
            stalled: false,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Next batch of answers, or `None` once the cursor is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ExternalAnswer>>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.stalled || self.pages >= self.max_pages {
            return Err(WaReviewError::PaginationLimit {
                pillar_id: self.pillar_id.to_string(),
                pages: self.pages,
            });
        }

        let page = self
            .api
            .list_answers(self.workload_id, self.pillar_id, self.cursor.as_deref())
            .await?;
        self.pages += 1;
        debug!(
            "Fetched page {} for pillar {} ({} answers)",
            self.pages,
            self.pillar_id,
            page.answers.len()
        );

        match page.next_cursor.filter(|c| !c.is_empty()) {
            None => self.exhausted = true,
            Some(next) => {
                if self.cursor.as_deref() == Some(next.as_str()) {
                    self.stalled = true;
                }
                self.cursor = Some(next);
            }
        }

        Ok(Some(page.answers))
    }

    /// Drain every remaining page into one list.
    pub async fn collect_all(mut self) -> Result<Vec<ExternalAnswer>> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_page().await? {
            all.extend(batch);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{AnswerPage, CheckpointRef, PillarRef};
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    /// Always returns one answer and the same cursor.
    struct LoopingApi;

    #[async_trait]
    impl ReviewApi for LoopingApi {
        async fn get_pillar_summaries(&self, _workload_id: &str) -> Result<Vec<PillarRef>> {
            Ok(vec![])
        }

        async fn list_answers(
            &self,
            _workload_id: &str,
            _pillar_id: &str,
            _cursor: Option<&str>,
        ) -> Result<AnswerPage> {
            Ok(AnswerPage {
                answers: vec![ExternalAnswer {
                    question_id: "q".to_string(),
                    question_title: "Q".to_string(),
                    selected_choice_ids: BTreeSet::new(),
                    choices: vec![],
                    risk: Default::default(),
                }],
                next_cursor: Some("same".to_string()),
            })
        }

        async fn update_answer(
            &self,
            _workload_id: &str,
            _question_id: &str,
            _selected: &BTreeSet<String>,
            _note: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn create_checkpoint(
            &self,
            _workload_id: &str,
            name: &str,
            _token: &str,
        ) -> Result<CheckpointRef> {
            Ok(CheckpointRef {
                name: name.to_string(),
                milestone_number: None,
            })
        }

        async fn get_review_report(&self, _workload_id: &str) -> Result<Vec<u8>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_repeated_cursor_stops_the_walk() {
        let api = LoopingApi;
        let mut pager = AnswerPager::new(&api, "wl", "security", 100);
        assert!(pager.next_page().await.unwrap().is_some());
        assert!(pager.next_page().await.unwrap().is_some());
        let err = pager.next_page().await.unwrap_err();
        assert!(matches!(err, WaReviewError::PaginationLimit { pages: 2, .. }));
    }

    #[tokio::test]
    async fn test_max_pages_guard() {
        let api = LoopingApi;
        let err = AnswerPager::new(&api, "wl", "security", 1)
            .collect_all()
            .await
            .unwrap_err();
        assert!(matches!(err, WaReviewError::PaginationLimit { pages: 1, .. }));
    }
}
