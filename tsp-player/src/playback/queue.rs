//! Render-side chunk queue
//!
//! Ordered chunks plus a read offset into the head chunk. Owned and mutated
//! only by the render loop; `queued_samples()` is always the exact unplayed
//! backlog.

use crate::audio::types::AudioChunk;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct RenderQueue {
    chunks: VecDeque<AudioChunk>,
    head_offset: usize,
    queued_samples: u64,
}

impl RenderQueue {
    /// Create a queue with room for `capacity` chunks before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity),
            head_offset: 0,
            queued_samples: 0,
        }
    }

    /// Append a chunk. Empty chunks are discarded.
    pub fn push(&mut self, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }
        self.queued_samples += chunk.len() as u64;
        self.chunks.push_back(chunk);
    }

    /// Copy queued audio into `out`, advancing through chunks.
    ///
    /// Returns how many samples were written; the rest of `out` is untouched.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;

        while written < out.len() {
            let Some(head) = self.chunks.front() else {
                break;
            };

            let available = &head.samples()[self.head_offset..];
            let to_copy = available.len().min(out.len() - written);
            out[written..written + to_copy].copy_from_slice(&available[..to_copy]);

            written += to_copy;
            self.head_offset += to_copy;
            self.queued_samples -= to_copy as u64;

            if self.head_offset >= head.len() {
                self.chunks.pop_front();
                self.head_offset = 0;
            }
        }

        written
    }

    /// Drop everything queued
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.head_offset = 0;
        self.queued_samples = 0;
    }

    pub fn queued_samples(&self) -> u64 {
        self.queued_samples
    }

    /// Number of chunks still holding unplayed audio
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
