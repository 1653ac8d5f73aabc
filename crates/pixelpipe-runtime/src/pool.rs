//! Physical buffer allocation for one installed schedule.
//!
//! Plain buffers get one allocation each; feedback rings get two, flipped
//! after every frame so "previous" always names the slot written one frame
//! ago. Allocation ids are dense and stable for the schedule's lifetime.

use pixelpipe_compiler::{BufferRef, FeedbackSlot, FrameSchedule};

/// One allocation the backend can bind.
#[derive(Debug, Clone)]
pub struct PhysicalBuffer {
    pub id: usize,
    pub size: u64,
    /// Bumped when the allocation is recycled by a ring flip.
    pub generation: u64,
}

#[derive(Debug)]
struct Ring {
    /// [front, back]: front is written this frame, back holds last frame.
    slots: [usize; 2],
}

/// All allocations backing one schedule.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<PhysicalBuffer>,
    plain: Vec<usize>,
    rings: Vec<Ring>,
    dummy: usize,
}

impl BufferPool {
    /// Allocate every buffer and ring the schedule asks for.
    pub fn realize(schedule: &FrameSchedule) -> Self {
        let mut buffers = Vec::new();
        let mut alloc = |size: u64| {
            let id = buffers.len();
            buffers.push(PhysicalBuffer {
                id,
                size,
                generation: 0,
            });
            id
        };

        // one 4-byte dummy for absent optional inputs
        let dummy = alloc(4);
        let plain: Vec<usize> = schedule.buffers.iter().map(|b| alloc(b.size)).collect();
        let rings: Vec<Ring> = schedule
            .rings
            .iter()
            .map(|b| Ring {
                slots: [alloc(b.size), alloc(b.size)],
            })
            .collect();

        Self {
            buffers,
            plain,
            rings,
            dummy,
        }
    }

    /// Resolve a schedule-level buffer reference to an allocation.
    pub fn resolve(&self, r: BufferRef) -> &PhysicalBuffer {
        let id = match r {
            BufferRef::Buffer(i) => self.plain[i],
            BufferRef::Feedback { ring, slot } => {
                let ring = &self.rings[ring];
                match slot {
                    FeedbackSlot::Current => ring.slots[0],
                    FeedbackSlot::Previous => ring.slots[1],
                }
            }
            BufferRef::Dummy => self.dummy,
        };
        &self.buffers[id]
    }

    /// Swap every ring's slots after a submitted frame: what was written
    /// becomes "previous", and the recycled slot's generation is bumped.
    pub fn flip_feedback(&mut self) {
        for ring in &mut self.rings {
            ring.slots.swap(0, 1);
            let recycled = ring.slots[0];
            self.buffers[recycled].generation += 1;
        }
    }

    pub fn allocation_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total bytes across all allocations, dummy included.
    pub fn total_bytes(&self) -> u64 {
        self.buffers.iter().map(|b| b.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelpipe_compiler::BufferDesc;
    use pixelpipe_core::{Format, Roi};

    fn schedule_with(buffers: usize, rings: usize) -> FrameSchedule {
        let desc = BufferDesc {
            size: 1024,
            format: Format::new("rgba", "f16"),
            roi: Roi::full(16, 16),
        };
        FrameSchedule {
            units: Vec::new(),
            buffers: vec![desc.clone(); buffers],
            rings: vec![desc; rings],
        }
    }

    #[test]
    fn test_realize_allocates_rings_twice() {
        let pool = BufferPool::realize(&schedule_with(2, 1));
        // dummy + 2 plain + 2 ring slots
        assert_eq!(pool.allocation_count(), 5);
        assert_eq!(pool.total_bytes(), 4 + 4 * 1024);
    }

    #[test]
    fn test_flip_swaps_current_and_previous() {
        let mut pool = BufferPool::realize(&schedule_with(0, 1));
        let current = BufferRef::Feedback {
            ring: 0,
            slot: FeedbackSlot::Current,
        };
        let previous = BufferRef::Feedback {
            ring: 0,
            slot: FeedbackSlot::Previous,
        };
        let written = pool.resolve(current).id;
        pool.flip_feedback();
        // last frame's write is now the previous slot
        assert_eq!(pool.resolve(previous).id, written);
        // and the recycled slot was invalidated
        assert_eq!(pool.resolve(current).generation, 1);
    }

    #[test]
    fn test_dummy_resolves() {
        let pool = BufferPool::realize(&schedule_with(1, 0));
        assert_eq!(pool.resolve(BufferRef::Dummy).size, 4);
    }
}
