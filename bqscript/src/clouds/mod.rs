//! Cloud-specific code.

pub(crate) mod gcloud;
