// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deferred release of GPU objects.
//!
//! The GPU may still read an object for up to `ring_buffer_depth` frames after
//! the CPU stops using it, so objects are not destroyed on release. They are
//! pushed with the frame they become safe to destroy at and drained once per
//! frame.

use std::collections::VecDeque;

/// An object waiting for its retire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Retired<T> {
    item: T,
    retire_at: u64,
}

/// A FIFO of objects keyed by the frame they may be destroyed at.
#[derive(Debug, Clone)]
pub struct RetireQueue<T> {
    items: VecDeque<Retired<T>>,
}

impl<T> Default for RetireQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> RetireQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `item` for destruction once `frame_count` reaches `retire_at`.
    pub fn push(&mut self, item: T, retire_at: u64) {
        // Keep the queue sorted so draining can stop at the first live entry.
        let position = self
            .items
            .iter()
            .rposition(|r| r.retire_at <= retire_at)
            .map_or(0, |i| i + 1);
        self.items.insert(position, Retired { item, retire_at });
    }

    /// Removes and returns every item whose retire frame is `<= frame_count`.
    pub fn drain_ready(&mut self, frame_count: u64) -> Vec<T> {
        let ready = self
            .items
            .iter()
            .take_while(|r| r.retire_at <= frame_count)
            .count();
        self.items.drain(..ready).map(|r| r.item).collect()
    }

    /// Removes and returns everything, ready or not.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.items.drain(..).map(|r| r.item).collect()
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_released_before_retire_frame() {
        let mut queue = RetireQueue::new();
        queue.push("staging", 5);
        for frame in 0..5 {
            assert!(queue.drain_ready(frame).is_empty(), "frame {frame}");
        }
        assert_eq!(queue.drain_ready(5), vec!["staging"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_everything_released_after_retire_frame() {
        let mut queue = RetireQueue::new();
        queue.push(1, 3);
        queue.push(2, 4);
        queue.push(3, 3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain_ready(100), vec![1, 3, 2]);
    }

    #[test]
    fn test_out_of_order_push_keeps_order() {
        let mut queue = RetireQueue::new();
        queue.push('c', 9);
        queue.push('a', 2);
        queue.push('b', 5);
        assert_eq!(queue.drain_ready(5), vec!['a', 'b']);
        assert_eq!(queue.drain_all(), vec!['c']);
    }
}
