//! Lead capture: records, the contact form, and where leads go.

pub mod model;
pub mod sink;

pub use model::{ContactForm, LeadRecord, LeadSource, email_pattern};
pub use sink::{LeadSink, StoreLeadSink};
