use crate::{storage::Impression, Attributes};

/// Receives every impression the client records, together with the attributes it was evaluated
/// with. Use it to forward decisions to your own analytics.
///
/// Listeners run on the evaluation thread and must be fast. Panics are caught and logged.
pub trait ImpressionListener {
    /// Called once per recorded impression.
    fn log_impression(&self, impression: &Impression, attributes: &Attributes);
}

pub(crate) struct NoopImpressionListener;

impl ImpressionListener for NoopImpressionListener {
    fn log_impression(&self, _impression: &Impression, _attributes: &Attributes) {}
}

impl<T: Fn(&Impression, &Attributes)> ImpressionListener for T {
    fn log_impression(&self, impression: &Impression, attributes: &Attributes) {
        self(impression, attributes);
    }
}
