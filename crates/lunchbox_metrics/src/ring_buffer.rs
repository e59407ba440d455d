//! Rolling window of per-frame samples

#[derive(Debug, Clone)]
pub struct RingBuffer {
    samples: Vec<f64>,
    capacity: usize,
    index: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            index: 0,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.index] = sample;
        }
        self.index = (self.index + 1) % self.capacity;
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn peak(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_wraps() {
        let mut buffer = RingBuffer::new(3);

        buffer.push(10.0);
        assert_eq!(buffer.average(), 10.0);

        buffer.push(20.0);
        buffer.push(30.0);
        assert_eq!(buffer.average(), 20.0);

        // Oldest sample is overwritten
        buffer.push(40.0);
        assert_eq!(buffer.average(), 30.0);
        assert_eq!(buffer.peak(), 40.0);
        assert_eq!(buffer.len(), 3);
    }
}
