use crate::runtime::Phase;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a run can fail. A run either completes all phases or returns one of these;
/// no partial output is ever reported as success.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn {phase} worker {unit}: {source}")]
    Spawn {
        phase: Phase,
        unit: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("{phase} worker {unit} panicked: {message}")]
    WorkerPanicked { phase: Phase, unit: usize, message: String },

    #[error("partitioner routed key {key:?} to partition {partition}, but only {num_partitions} exist")]
    PartitionOutOfRange { key: String, partition: usize, num_partitions: usize },

    #[error("failed to build {phase} worker pool: {message}")]
    Pool { phase: Phase, message: String },
}

/// Best-effort rendering of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_handles_common_payloads() {
        let p: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(p.as_ref()), "boom");
        let p: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(p.as_ref()), "owned boom");
        let p: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(p.as_ref()), "non-string panic payload");
    }

    #[test]
    fn display_names_phase_and_unit() {
        let e = Error::WorkerPanicked { phase: Phase::Reduce, unit: 3, message: "bad".into() };
        assert_eq!(e.to_string(), "reduce worker 3 panicked: bad");
    }
}
