//! Lunchbox Metrics - allocator and upload telemetry
//!
//! Zero-cost counters and rolling averages that vanish in production builds
//! via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use lunchbox_metrics::{Counter, RingBuffer};
//!
//! let mut counter = Counter::new();
//! counter.increment("uploads", 1);
//!
//! let mut bytes_per_frame = RingBuffer::new(60);
//! bytes_per_frame.push(4096.0);
//! println!("avg upload: {:.0} B/frame", bytes_per_frame.average());
//! ```
//!
//! Without the `metrics` feature every call below compiles to nothing.

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod ring_buffer;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;

/// Execute code only when metrics are enabled
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default, Clone)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn reset_all(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone)]
pub struct RingBuffer;

#[cfg(not(feature = "metrics"))]
impl RingBuffer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn push(&mut self, _value: f64) {}
    pub fn average(&self) -> f64 { 0.0 }
    pub fn peak(&self) -> f64 { 0.0 }
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_compiles_with_or_without_metrics() {
        let mut counter = super::Counter::new();
        counter.increment("uploads", 2);
        let mut buffer = super::RingBuffer::new(10);
        buffer.push(1.0);
        let _ = buffer.average();
    }
}
