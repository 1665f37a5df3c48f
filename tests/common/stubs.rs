//! Commentary services with fixed behavior.

#![allow(dead_code)]

use std::cell::Cell;

use rps_arena::{CommentaryError, CommentaryRequest, CommentaryService};

/// Always answers with the same text and counts how often it was asked.
#[derive(Debug, Default)]
pub struct CannedCommentary {
    pub text: String,
    pub calls: Cell<usize>,
}

impl CannedCommentary {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            calls: Cell::new(0),
        }
    }
}

impl CommentaryService for CannedCommentary {
    fn request_commentary(
        &mut self,
        _request: &CommentaryRequest,
    ) -> Result<String, CommentaryError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.text.clone())
    }
}

/// Always fails with the configured error.
#[derive(Debug, Clone)]
pub struct BrokenCommentary(pub CommentaryError);

impl CommentaryService for BrokenCommentary {
    fn request_commentary(
        &mut self,
        _request: &CommentaryRequest,
    ) -> Result<String, CommentaryError> {
        Err(self.0.clone())
    }
}

/// Describes the round from the request alone, like a real service would.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescribingCommentary;

impl CommentaryService for DescribingCommentary {
    fn request_commentary(
        &mut self,
        request: &CommentaryRequest,
    ) -> Result<String, CommentaryError> {
        Ok(format!(
            "[{}] {} {} vs {} {}",
            request.mode.tag(),
            request.local_name,
            request.local_action,
            request.remote_action,
            request.opponent_name
        ))
    }
}
