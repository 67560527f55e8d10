//! Multipart adapter for artifact intake.

use axum::extract::Multipart;
use idiogen_core::{Intake, Role};

use crate::error::ServerResult;

/// Stream every recognised part of `multipart` into `intake`.
///
/// Parts are written chunk by chunk as they arrive. Unknown parts are skipped.
pub async fn store_multipart(multipart: &mut Multipart, intake: &mut Intake<'_>) -> ServerResult<()> {
    while let Some(mut field) = multipart.next_field().await? {
        let Some(role) = field.name().and_then(Role::from_part_name) else {
            tracing::debug!("ignoring unknown part {:?}", field.name());
            continue;
        };
        let declared = field.file_name().map(str::to_string);

        let mut upload = intake.begin(role, declared.as_deref()).await?;
        while let Some(chunk) = field.chunk().await? {
            upload.write(&chunk).await?;
        }
        intake.commit(upload).await?;
    }
    Ok(())
}
