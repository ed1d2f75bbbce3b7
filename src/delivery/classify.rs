use crate::clients::delivery::DeliveryDispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Permanent,
    Retriable,
    Unknown,
}

/// Sorts a whole-batch dispatch failure into the three buckets the retry
/// loop cares about (spec §4.9, §7): configuration mistakes never succeed on
/// retry, throttling/unavailability/generic transport failures usually do,
/// and anything left over is conservatively dropped without retry but
/// logged loudly so it gets noticed.
pub fn classify(err: &DeliveryDispatchError) -> Classification {
    match err {
        DeliveryDispatchError::StreamNotFound { .. }
        | DeliveryDispatchError::InvalidArgument { .. } => Classification::Permanent,
        DeliveryDispatchError::Throttled { .. } | DeliveryDispatchError::ServiceUnavailable { .. } => {
            Classification::Retriable
        }
        DeliveryDispatchError::Unknown { .. } => Classification::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_not_found_is_permanent() {
        assert_eq!(
            classify(&DeliveryDispatchError::StreamNotFound {
                stream_name: "s".into()
            }),
            Classification::Permanent
        );
    }

    #[test]
    fn throttled_is_retriable() {
        assert_eq!(
            classify(&DeliveryDispatchError::Throttled { stream_name: "s".into() }),
            Classification::Retriable
        );
    }

    #[test]
    fn service_unavailable_is_retriable() {
        assert_eq!(
            classify(&DeliveryDispatchError::ServiceUnavailable {
                stream_name: "s".into(),
                source: anyhow::anyhow!("connection reset"),
            }),
            Classification::Retriable
        );
    }

    #[test]
    fn unrecognized_error_is_unknown() {
        assert_eq!(
            classify(&DeliveryDispatchError::Unknown {
                stream_name: "s".into(),
                source: anyhow::anyhow!("boom"),
            }),
            Classification::Unknown
        );
    }
}
