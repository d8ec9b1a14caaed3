use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};
use std::fmt;
use thiserror::Error;

/// Bootstrap stacks are named `<service>-deploy-bootstrap`.
pub const STACK_NAME_SUFFIX: &str = "-deploy-bootstrap";

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("service name must not be empty")]
    EmptyServiceName,
    #[error("stack name '{0}' does not end with '-deploy-bootstrap'; refusing to guess a service name")]
    MissingStackSuffix(String),
}

/// Logical name of the application being granted deploy permissions.
///
/// Every resource scope in the bootstrap template is derived from this name,
/// so an empty or wrongly-derived name would scope permissions to the wrong
/// resources. Construction therefore fails loudly instead of falling back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Result<Self, BootstrapError> {
        let name = name.into();
        if name.is_empty() {
            return Err(BootstrapError::EmptyServiceName);
        }
        Ok(Self(name))
    }

    /// Recover the service name from a bootstrap stack's own name by
    /// stripping [`STACK_NAME_SUFFIX`]. A stack name without the suffix is
    /// rejected rather than used verbatim.
    pub fn from_stack_name(stack_name: &str) -> Result<Self, BootstrapError> {
        match stack_name.strip_suffix(STACK_NAME_SUFFIX) {
            Some(base) if !base.is_empty() => Ok(Self(base.to_string())),
            _ => Err(BootstrapError::MissingStackSuffix(stack_name.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resource-matching ARN pattern with named fields, so tests and lints can
/// look at the parts instead of substring-grepping a formatted string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArnPattern {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    pub resource: String,
}

impl ArnPattern {
    pub fn new(
        service: impl Into<String>,
        region: impl Into<String>,
        account: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            partition: "aws".to_string(),
            service: service.into(),
            region: region.into(),
            account: account.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for ArnPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

/// The account/region/service triple every scope pattern interpolates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeContext {
    pub service_name: ServiceName,
    pub account_id: String,
    pub region: String,
}

impl ScopeContext {
    pub fn new(service_name: ServiceName, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self { service_name, account_id: account_id.into(), region: region.into() }
    }

    pub fn cloudformation_stacks(&self) -> ArnPattern {
        ArnPattern::new(
            "cloudformation",
            &self.region,
            &self.account_id,
            format!("stack/{}*", self.service_name),
        )
    }

    // S3 ARNs carry no region or account segment.
    pub fn s3_buckets(&self) -> ArnPattern {
        ArnPattern::new("s3", "", "", format!("{}*", self.service_name))
    }

    pub fn s3_objects(&self) -> ArnPattern {
        ArnPattern::new("s3", "", "", format!("{}*/*", self.service_name))
    }

    pub fn log_groups(&self) -> ArnPattern {
        ArnPattern::new(
            "logs",
            &self.region,
            &self.account_id,
            format!("log-group:{}*", self.service_name),
        )
    }

    pub fn lambda_functions(&self) -> ArnPattern {
        ArnPattern::new(
            "lambda",
            &self.region,
            &self.account_id,
            format!("function:{}*", self.service_name),
        )
    }

    pub fn state_machines(&self) -> ArnPattern {
        ArnPattern::new(
            "states",
            &self.region,
            &self.account_id,
            format!("stateMachine:{}*", self.service_name),
        )
    }

    pub fn iam_roles(&self) -> ArnPattern {
        ArnPattern::new("iam", "", &self.account_id, format!("role/{}*", self.service_name))
    }

    /// The deployment tooling names its artifact bucket with a
    /// `deploymentbucket` infix and a random suffix, so this one matches on a
    /// substring instead of a bare prefix.
    pub fn deployment_bucket(&self) -> ArnPattern {
        ArnPattern::new("s3", "", "", format!("{}*deploymentbucket*", self.service_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// One allow/deny rule: a set of actions against a list of resource scopes.
/// Statements are purely additive; nothing ever merges or deduplicates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<String>) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
        }
    }

    pub fn to_cfn_json(&self) -> Json {
        json!({
            "Effect": self.effect.as_str(),
            "Action": self.actions,
            "Resource": self.resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> ScopeContext {
        ScopeContext::new(
            ServiceName::new("orders-api").unwrap(),
            "111111111111",
            "us-east-1",
        )
    }

    #[test]
    fn service_name_rejects_empty() {
        assert!(matches!(ServiceName::new(""), Err(BootstrapError::EmptyServiceName)));
    }

    #[test]
    fn stack_name_suffix_is_stripped() {
        let name = ServiceName::from_stack_name("orders-api-deploy-bootstrap").unwrap();
        assert_eq!(name.as_str(), "orders-api");
    }

    #[test]
    fn stack_name_without_suffix_is_rejected() {
        let err = ServiceName::from_stack_name("orders-api").unwrap_err();
        assert!(err.to_string().contains("orders-api"));
        assert!(err.to_string().contains("-deploy-bootstrap"));
    }

    #[test]
    fn bare_suffix_stack_name_is_rejected() {
        assert!(ServiceName::from_stack_name("-deploy-bootstrap").is_err());
    }

    #[test]
    fn scope_patterns_render_documented_arns() {
        let ctx = ctx();
        assert_eq!(ctx.s3_objects().to_string(), "arn:aws:s3:::orders-api*/*");
        assert_eq!(ctx.s3_buckets().to_string(), "arn:aws:s3:::orders-api*");
        assert_eq!(
            ctx.lambda_functions().to_string(),
            "arn:aws:lambda:us-east-1:111111111111:function:orders-api*"
        );
        assert_eq!(
            ctx.cloudformation_stacks().to_string(),
            "arn:aws:cloudformation:us-east-1:111111111111:stack/orders-api*"
        );
        assert_eq!(
            ctx.log_groups().to_string(),
            "arn:aws:logs:us-east-1:111111111111:log-group:orders-api*"
        );
        assert_eq!(
            ctx.state_machines().to_string(),
            "arn:aws:states:us-east-1:111111111111:stateMachine:orders-api*"
        );
        assert_eq!(
            ctx.iam_roles().to_string(),
            "arn:aws:iam::111111111111:role/orders-api*"
        );
    }

    #[test]
    fn deployment_bucket_embeds_service_name() {
        let pat = ctx().deployment_bucket();
        assert_eq!(pat.to_string(), "arn:aws:s3:::orders-api*deploymentbucket*");
        assert!(pat.resource.starts_with("orders-api"));
        assert!(pat.resource.contains("deploymentbucket"));
    }

    #[test]
    fn every_pattern_is_service_name_prefixed() {
        let ctx = ctx();
        let prefixed = [
            ctx.s3_buckets(),
            ctx.s3_objects(),
            ctx.deployment_bucket(),
        ];
        for pat in prefixed {
            assert!(pat.resource.starts_with("orders-api"), "pattern {pat}");
        }
        let typed = [
            (ctx.cloudformation_stacks(), "stack/orders-api*"),
            (ctx.log_groups(), "log-group:orders-api*"),
            (ctx.lambda_functions(), "function:orders-api*"),
            (ctx.state_machines(), "stateMachine:orders-api*"),
            (ctx.iam_roles(), "role/orders-api*"),
        ];
        for (pat, resource) in typed {
            assert_eq!(pat.resource, resource);
        }
    }

    #[test]
    fn statement_serializes_to_policy_document_shape() {
        let stmt = PolicyStatement::allow(&["s3:GetObject"], vec!["arn:aws:s3:::orders-api*/*".into()]);
        assert_eq!(
            stmt.to_cfn_json(),
            json!({
                "Effect": "Allow",
                "Action": ["s3:GetObject"],
                "Resource": ["arn:aws:s3:::orders-api*/*"],
            })
        );
    }
}
