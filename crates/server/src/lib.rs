pub mod error;
pub mod middleware;
pub mod routes;
pub mod validation;

pub type DeploymentImpl = local_deployment::LocalDeployment;
