/// Connection-quality input signal
///
/// The dashboard host reports the current connection class and data-saver
/// preference; clients consume it to pick conservative page sizes. It is an
/// input only - limiter and retry behavior never depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionQuality {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    /// Suggested page size for list endpoints under this connection class.
    pub fn page_size(&self) -> usize {
        match self {
            ConnectionQuality::Excellent => 50,
            ConnectionQuality::Good => 25,
            ConnectionQuality::Fair => 10,
            ConnectionQuality::Poor => 5,
        }
    }
}

/// Source of the current network signal. The embedding application supplies
/// an implementation; `StaticSignal` covers tests and headless use.
pub trait NetworkSignal: Send + Sync {
    fn quality(&self) -> ConnectionQuality;
    fn data_saver(&self) -> bool;

    /// Effective page size: data saver clamps to the most conservative size.
    fn effective_page_size(&self) -> usize {
        if self.data_saver() {
            ConnectionQuality::Poor.page_size()
        } else {
            self.quality().page_size()
        }
    }
}

/// Fixed signal for tests and environments without capability detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSignal {
    pub quality: ConnectionQuality,
    pub data_saver: bool,
}

impl NetworkSignal for StaticSignal {
    fn quality(&self) -> ConnectionQuality {
        self.quality
    }

    fn data_saver(&self) -> bool {
        self.data_saver
    }
}
