use metrics::{describe_counter, describe_histogram, Unit};

pub const ID_STREAM_FAILURE: &str = "tinyid.id_stream.failure.total";
pub const ID_STREAM_REFILL_DURATION: &str = "tinyid.id_stream.refill_duration.seconds";

pub const KIND: &str = "kind";
pub const ACTION: &str = "action";

pub const ACTION_GET_VALUE: &str = "get-value";
pub const ACTION_SET_VALUE: &str = "set-value";
pub const ACTION_REFILL: &str = "refill";

pub fn describe_metrics() {
    describe_counter!(
        ID_STREAM_FAILURE,
        Unit::Count,
        "Failed identifier stream operations, label 'action' is one of 'get-value', 'set-value' or 'refill'"
    );

    describe_histogram!(
        ID_STREAM_REFILL_DURATION,
        Unit::Seconds,
        "Time spent reserving a new identifier range, including retries"
    );
}
