//! Authentication support for Google Cloud.

use std::sync::Arc;

use gcp_auth::TokenProvider;

use crate::common::*;

/// Something that can hand out OAuth2 access tokens.
pub(crate) type Authenticator = Arc<dyn TokenProvider>;

/// Find credentials, trying in order: `GOOGLE_APPLICATION_CREDENTIALS`, the
/// GCE metadata server, `gcloud auth application-default login`, and finally
/// the `gcloud` CLI itself.
#[instrument(level = "trace")]
pub(crate) async fn authenticator() -> Result<Authenticator> {
    let provider = gcp_auth::provider()
        .await
        .context("could not find Google Cloud credentials")?;
    match provider.project_id().await {
        Ok(project) => debug!("authenticated with default project {}", project),
        Err(err) => trace!("credentials have no default project: {}", err),
    }
    Ok(provider)
}
