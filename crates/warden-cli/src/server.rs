//! HTTPS server hosting the admission webhooks

use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use tracing::info;
use warden_engine::{Env, Gateway, ReviewCodec, default_registry, router};
use warden_kube::KubeResolver;

use crate::config::Args;
use crate::error::{CliError, Result};

/// Build the gateway from the arguments and serve until the process stops
pub async fn run(args: Args) -> Result<()> {
    let config = args.engine_config()?;
    let retry = args.retry_policy()?;

    let tls = RustlsConfig::from_pem_file(&args.tls_cert_file, &args.tls_key_file)
        .await
        .map_err(|e| CliError::Tls {
            message: format!(
                "cannot load {} / {}: {e}",
                args.tls_cert_file.display(),
                args.tls_key_file.display()
            ),
        })?;

    let resolver = KubeResolver::try_default(retry).await?;
    info!(
        zones = ?config.zones.as_slice(),
        admins = ?config.access.admins().collect::<Vec<_>>(),
        restricted_groups = ?config.access.restricted_groups().collect::<Vec<_>>(),
        retry_attempts = retry.attempts,
        retry_delay_ms = retry.delay.as_millis() as u64,
        "engine configured"
    );

    let registry = default_registry();
    info!(
        mutated = ?registry.mutated_kinds().collect::<Vec<_>>(),
        validated = ?registry.validated_kinds().collect::<Vec<_>>(),
        "handlers registered"
    );

    let gateway = Gateway::new(
        registry,
        ReviewCodec::new().with_max_body_bytes(args.max_body_bytes),
        Env::new(config, Arc::new(resolver)),
    );
    let app = router(Arc::new(gateway));

    info!(address = %args.address, "serving admission webhooks");
    axum_server::bind_rustls(args.address, tls)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
