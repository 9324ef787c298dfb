//! Endpoint provisioning and flow deployment

use crate::app::DeployArgs;
use anyhow::{Context, Result};
use ragflow_core::{default_chain, DeploymentSpec, EndpointSpec, Provisioner, TokenProvider};
use std::time::Duration;

pub async fn run(args: DeployArgs) -> Result<()> {
    let (settings, config) = super::resolve_config().await?;

    let stamp = chrono::Utc::now().format("%m%d%H%M");
    let endpoint_name = args
        .endpoint_name
        .unwrap_or_else(|| format!("rag-{stamp}-endpoint"));
    let deployment_name = args
        .deployment_name
        .unwrap_or_else(|| format!("rag-{stamp}-deployment"));

    let token = default_chain()?
        .token()
        .await?
        .context("deployment requires a management token; set AZURE_ACCESS_TOKEN or run with a managed identity")?;

    let provisioner = Provisioner::new(
        config.clone(),
        token,
        Duration::from_secs(settings.timeout_secs),
    )?;

    let endpoint = EndpointSpec::new(&endpoint_name)?;
    let deployment = DeploymentSpec::new(&deployment_name, &endpoint_name)?
        .with_service_environment(&config);

    let identity = provisioner.ensure_endpoint(&endpoint).await?;
    provisioner.grant_default_roles(&identity.principal_id).await?;
    provisioner.create_deployment(&deployment).await?;
    provisioner
        .route_all_traffic(&endpoint_name, &deployment_name)
        .await?;

    println!("~~~ Deployment details ~~~");
    println!("Endpoint name:   {endpoint_name}");
    println!("Deployment name: {deployment_name}");
    println!();
    println!("Inspect the deployment in the studio:");
    println!("{}", provisioner.studio_url(&endpoint_name, &deployment_name));
    Ok(())
}
