//! Builds the deploy-bootstrap CloudFormation template: the minimum IAM
//! surface a serverless application's deployment tooling needs in a target
//! account, scoped to resources named after the service.
//!
//! Construction is a single pass over fixed inputs. Nothing here talks to the
//! network; the rendered template is handed to CloudFormation elsewhere.

use serde_json::json;
use slsboot_cfn::{CfnOutput, CfnTemplate};
use slsboot_core::{BootstrapError, PolicyStatement, ScopeContext, ServiceName};
use slsboot_iam::{DeployGroup, DeployUser, GroupMembership, ServiceRole};

/// Shape version of the bootstrap definition. Bumped by hand whenever the
/// statement set changes; never computed.
pub const BOOTSTRAP_VERSION: &str = "1";

/// SSM namespace the version parameter lives under.
pub const PARAMETER_NAMESPACE: &str = "/serverless-deploy-bootstrap";

// Action lists are a compatibility contract with the deployment tooling:
// they encode the minimum permissions it needs. Edit in lockstep with that
// tooling, not for tidiness.

const S3_OBJECT_ACTIONS: &[&str] = &["s3:PutObject", "s3:GetObject", "s3:DeleteObject"];

const S3_BUCKET_ACTIONS: &[&str] = &["s3:*"];

const LOG_GROUP_ACTIONS: &[&str] = &[
    "logs:CreateLogGroup",
    "logs:DeleteLogGroup",
    "logs:DescribeLogGroups",
    "logs:DescribeLogStreams",
    "logs:FilterLogEvents",
    "logs:GetLogEvents",
    "logs:PutRetentionPolicy",
];

const LAMBDA_ACTIONS: &[&str] = &[
    "lambda:GetFunction",
    "lambda:GetFunctionConfiguration",
    "lambda:CreateFunction",
    "lambda:DeleteFunction",
    "lambda:UpdateFunctionCode",
    "lambda:UpdateFunctionConfiguration",
    "lambda:ListVersionsByFunction",
    "lambda:PublishVersion",
    "lambda:CreateAlias",
    "lambda:UpdateAlias",
    "lambda:DeleteAlias",
    "lambda:AddPermission",
    "lambda:RemovePermission",
    "lambda:InvokeFunction",
    "lambda:TagResource",
    "lambda:UntagResource",
];

const IAM_ROLE_ACTIONS: &[&str] = &[
    "iam:GetRole",
    "iam:CreateRole",
    "iam:DeleteRole",
    "iam:PutRolePolicy",
    "iam:DeleteRolePolicy",
    "iam:AttachRolePolicy",
    "iam:DetachRolePolicy",
    "iam:PassRole",
];

const DYNAMODB_TABLE_ACTIONS: &[&str] = &[
    "dynamodb:CreateTable",
    "dynamodb:DescribeTable",
    "dynamodb:UpdateTable",
    "dynamodb:DeleteTable",
];

const STATE_MACHINE_ACTIONS: &[&str] = &[
    "states:CreateStateMachine",
    "states:UpdateStateMachine",
    "states:DeleteStateMachine",
    "states:DescribeStateMachine",
    "states:TagResource",
];

const CFN_STACK_ACTIONS: &[&str] = &[
    "cloudformation:CreateStack",
    "cloudformation:UpdateStack",
    "cloudformation:DeleteStack",
    "cloudformation:DescribeStacks",
    "cloudformation:DescribeStackEvents",
    "cloudformation:DescribeStackResource",
    "cloudformation:ListStackResources",
    "cloudformation:GetTemplate",
    "cloudformation:CreateChangeSet",
    "cloudformation:DescribeChangeSet",
    "cloudformation:ExecuteChangeSet",
    "cloudformation:DeleteChangeSet",
];

/// Pure builder for the bootstrap template. Identical inputs always produce
/// an identical template; there is no clock, randomness, or I/O involved.
#[derive(Debug, Clone)]
pub struct BootstrapStack {
    scope: ScopeContext,
}

impl BootstrapStack {
    pub fn new(service_name: ServiceName, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self { scope: ScopeContext::new(service_name, account_id, region) }
    }

    /// Derive the service name from the bootstrap stack's own name.
    pub fn from_stack_name(
        stack_name: &str,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, BootstrapError> {
        Ok(Self::new(ServiceName::from_stack_name(stack_name)?, account_id, region))
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.scope.service_name
    }

    pub fn region(&self) -> &str {
        &self.scope.region
    }

    pub fn parameter_path(&self) -> String {
        format!("{}/{}/version", PARAMETER_NAMESPACE, self.scope.service_name)
    }

    /// The role CloudFormation assumes while provisioning the application's
    /// stacks. Statement order is fixed and load-bearing for template diffs.
    pub fn service_role(&self) -> ServiceRole {
        let ctx = &self.scope;
        let statements = vec![
            PolicyStatement::allow(S3_OBJECT_ACTIONS, vec![ctx.s3_objects().to_string()]),
            PolicyStatement::allow(S3_BUCKET_ACTIONS, vec![ctx.s3_buckets().to_string()]),
            PolicyStatement::allow(LOG_GROUP_ACTIONS, vec![ctx.log_groups().to_string()]),
            PolicyStatement::allow(LAMBDA_ACTIONS, vec![ctx.lambda_functions().to_string()]),
            PolicyStatement::allow(IAM_ROLE_ACTIONS, vec![ctx.iam_roles().to_string()]),
            // TODO: the dynamodb actions ride on the stateMachine scope, which
            // grants nothing useful; they almost certainly belong on a
            // dynamodb table ARN. Changing the scope changes what gets
            // granted, so it stays until the tooling owners confirm intent.
            PolicyStatement::allow(DYNAMODB_TABLE_ACTIONS, vec![ctx.state_machines().to_string()]),
            PolicyStatement::allow(STATE_MACHINE_ACTIONS, vec![ctx.state_machines().to_string()]),
        ];
        ServiceRole::new(format!("{}-cfn-role", ctx.service_name), statements)
    }

    pub fn deploy_user(&self) -> DeployUser {
        DeployUser::new(format!("{}-deployer", self.scope.service_name))
    }

    /// Deploy-time permissions shared by every member of the group.
    pub fn deploy_group(&self, service_role_arn: &str) -> DeployGroup {
        let ctx = &self.scope;
        let statements = vec![
            // template validation takes no resource scope
            PolicyStatement::allow(&["cloudformation:ValidateTemplate"], vec!["*".to_string()]),
            PolicyStatement::allow(CFN_STACK_ACTIONS, vec![ctx.cloudformation_stacks().to_string()]),
            // existence probe the tooling uses to skip unchanged functions
            PolicyStatement::allow(&["lambda:GetFunction"], vec![ctx.lambda_functions().to_string()]),
            // pass exactly the service role, never a wildcard
            PolicyStatement::allow(&["iam:PassRole"], vec![service_role_arn.to_string()]),
            PolicyStatement::allow(&["s3:*"], vec![ctx.deployment_bucket().to_string()]),
        ];
        DeployGroup::new(format!("{}-deployers", ctx.service_name), statements)
    }

    pub fn build(&self) -> CfnTemplate {
        let role = self.service_role();
        let role_arn = role.arn(&self.scope.account_id);
        let user = self.deploy_user();
        let group = self.deploy_group(&role_arn);
        let membership = GroupMembership::new(group.name.clone(), vec![user.name.clone()]);

        let mut tpl = CfnTemplate::new(format!(
            "Deploy bootstrap for {}: service role and deploy user/group",
            self.scope.service_name
        ));
        tpl.resource("ServiceRole", role.to_cfn_json());
        tpl.resource("DeployUser", user.to_cfn_json());
        tpl.resource("DeployGroup", group.to_cfn_json());
        tpl.resource("DeployGroupMembership", membership.to_cfn_json());
        // retained on stack deletion, audit trail of the active version
        tpl.resource(
            "BootstrapVersionParameter",
            json!({
                "Type": "AWS::SSM::Parameter",
                "DeletionPolicy": "Retain",
                "Properties": {
                    "Name": self.parameter_path(),
                    "Type": "String",
                    "Value": BOOTSTRAP_VERSION,
                    "Description": format!("Deploy bootstrap version active for {}", self.scope.service_name),
                },
            }),
        );

        tpl.output(
            "DeployUserName",
            CfnOutput::new(user.name.as_str(), "IAM user the deployment tooling authenticates as")
                .exported(format!("{}-DeployUserName", self.scope.service_name)),
        );
        tpl.output(
            "ServiceRoleArn",
            CfnOutput::new(role_arn.as_str(), "Role CloudFormation assumes for application stacks")
                .exported(format!("{}-ServiceRoleArn", self.scope.service_name)),
        );
        tpl.output(
            "BootstrapVersion",
            CfnOutput::new(BOOTSTRAP_VERSION, "Version of the bootstrap definition in effect"),
        );
        tpl
    }
}
