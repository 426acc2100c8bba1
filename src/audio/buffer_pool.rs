// BufferPool - pre-allocated chunk buffers for the recording gate
//
// The audio callback must never allocate, yet every captured chunk has to
// leave the callback as an owned copy (the audio runtime reuses its input
// buffers). Buffers therefore circulate through a lock-free SPSC ring:
//
// 1. Audio thread pops an empty buffer from the pool
// 2. Audio thread copies the block slice into it and sends it inside a chunk
// 3. Coordinator appends the samples to the capture and recycles the buffer
//
// All heap allocation happens in BufferPool::new.

use rtrb::{Consumer, Producer};

/// Default number of pooled buffers
pub const DEFAULT_BUFFER_COUNT: usize = 256;

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// Both ends of the pool ring
pub struct BufferPoolChannels {
    /// Coordinator side: returns emptied buffers
    pub pool_producer: Producer<AudioBuffer>,
    /// Audio thread side: takes empty buffers
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Lock-free pool of pre-allocated sample buffers
///
/// Buffers are handed out empty (`len() == 0`) with at least
/// `buffer_capacity` reserved, so copying a block of up to that many samples
/// into one never reallocates.
pub struct BufferPool;

impl BufferPool {
    /// Create a pool of `buffer_count` buffers
    ///
    /// # Panics
    /// Panics if buffer_count is 0 or buffer_capacity is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_capacity: usize) -> BufferPoolChannels {
        assert!(buffer_count > 0, "buffer_count must be greater than 0");
        assert!(buffer_capacity > 0, "buffer_capacity must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        for _ in 0..buffer_count {
            // Capacity equals count, so the ring cannot be full here
            let _ = pool_producer.push(Vec::with_capacity(buffer_capacity));
        }

        BufferPoolChannels {
            pool_producer,
            pool_consumer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_creation() {
        let mut channels = BufferPool::new(16, 512);

        let mut available_buffers = 0;
        while let Ok(buffer) = channels.pool_consumer.pop() {
            assert!(buffer.is_empty(), "Pool buffers start empty");
            assert!(buffer.capacity() >= 512, "Buffer capacity mismatch");
            available_buffers += 1;
        }
        assert_eq!(available_buffers, 16, "Expected 16 buffers in pool queue");
    }

    #[test]
    fn test_buffer_circulation() {
        let mut channels = BufferPool::new(2, 128);

        let mut buffer = channels.pool_consumer.pop().unwrap();
        let capacity = buffer.capacity();
        buffer.extend_from_slice(&[0.5; 128]);
        assert_eq!(buffer.capacity(), capacity, "Copy must not reallocate");

        buffer.clear();
        channels.pool_producer.push(buffer).unwrap();

        assert!(channels.pool_consumer.pop().is_ok());
        assert!(channels.pool_consumer.pop().is_ok());
        assert!(channels.pool_consumer.pop().is_err(), "Pool should be exhausted");
    }

    #[test]
    fn test_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Producer<AudioBuffer>>();
        assert_send::<Consumer<AudioBuffer>>();
        assert_send::<BufferPoolChannels>();
    }

    #[test]
    #[should_panic(expected = "buffer_count must be greater than 0")]
    fn test_zero_buffer_count_panics() {
        BufferPool::new(0, 1024);
    }

    #[test]
    #[should_panic(expected = "buffer_capacity must be greater than 0")]
    fn test_zero_buffer_capacity_panics() {
        BufferPool::new(16, 0);
    }
}
