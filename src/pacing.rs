use std::time::Duration;

use crate::fetch::uniform;

/// Delay inserted between successive requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Pacer {
    None,
    Fixed(Duration),
    Uniform { min: Duration, max: Duration },
}

impl Pacer {
    /// `Fixed` when both bounds agree, `Uniform` otherwise.
    pub fn between(min: Duration, max: Duration) -> Self {
        if min.is_zero() && max.is_zero() {
            Pacer::None
        } else if min >= max {
            Pacer::Fixed(min)
        } else {
            Pacer::Uniform { min, max }
        }
    }

    pub fn next_delay(&self) -> Duration {
        match self {
            Pacer::None => Duration::ZERO,
            Pacer::Fixed(d) => *d,
            Pacer::Uniform { min, max } => uniform(*min, *max),
        }
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
