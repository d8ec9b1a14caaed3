use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};
use slsboot_core::PolicyStatement;

/// The only principal allowed to assume the service role.
pub const CLOUDFORMATION_PRINCIPAL: &str = "cloudformation.amazonaws.com";

const POLICY_DOCUMENT_VERSION: &str = "2012-10-17";

fn policy_document(statements: &[PolicyStatement]) -> Json {
    json!({
        "Version": POLICY_DOCUMENT_VERSION,
        "Statement": statements.iter().map(|s| s.to_cfn_json()).collect::<Vec<_>>(),
    })
}

/// IAM role assumed by the provisioning engine while it creates and tears
/// down the application's resources. The trust relationship is fixed to
/// CloudFormation and is not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRole {
    pub name: String,
    pub statements: Vec<PolicyStatement>,
}

impl ServiceRole {
    pub fn new(name: impl Into<String>, statements: Vec<PolicyStatement>) -> Self {
        Self { name: name.into(), statements }
    }

    pub fn arn(&self, account_id: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", account_id, self.name)
    }

    pub fn to_cfn_json(&self) -> Json {
        json!({
            "Type": "AWS::IAM::Role",
            "Properties": {
                "RoleName": self.name,
                "AssumeRolePolicyDocument": {
                    "Version": POLICY_DOCUMENT_VERSION,
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": [CLOUDFORMATION_PRINCIPAL] },
                        "Action": "sts:AssumeRole",
                    }],
                },
                "Policies": [{
                    "PolicyName": format!("{}-policy", self.name),
                    "PolicyDocument": policy_document(&self.statements),
                }],
            },
        })
    }
}

/// IAM user the deployment tooling authenticates as. Carries no inline
/// policy of its own; everything comes through group membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployUser {
    pub name: String,
}

impl DeployUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn to_cfn_json(&self) -> Json {
        json!({
            "Type": "AWS::IAM::User",
            "Properties": { "UserName": self.name },
        })
    }
}

/// IAM group holding the deploy-time permission statements. Effective
/// permissions of a member are the plain union of the attached statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployGroup {
    pub name: String,
    pub statements: Vec<PolicyStatement>,
}

impl DeployGroup {
    pub fn new(name: impl Into<String>, statements: Vec<PolicyStatement>) -> Self {
        Self { name: name.into(), statements }
    }

    pub fn to_cfn_json(&self) -> Json {
        json!({
            "Type": "AWS::IAM::Group",
            "Properties": {
                "GroupName": self.name,
                "Policies": [{
                    "PolicyName": format!("{}-policy", self.name),
                    "PolicyDocument": policy_document(&self.statements),
                }],
            },
        })
    }
}

/// Membership link between the deploy user and the deploy group. This is a
/// separate resource, not a policy attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group: String,
    pub users: Vec<String>,
}

impl GroupMembership {
    pub fn new(group: impl Into<String>, users: Vec<String>) -> Self {
        Self { group: group.into(), users }
    }

    pub fn to_cfn_json(&self) -> Json {
        json!({
            "Type": "AWS::IAM::UserToGroupAddition",
            "Properties": {
                "GroupName": self.group,
                "Users": self.users,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn role_trusts_only_cloudformation() {
        let role = ServiceRole::new("orders-api-cfn-role", vec![]);
        let doc = role.to_cfn_json();
        let principals = &doc["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"];
        assert_eq!(principals, &json!(["cloudformation.amazonaws.com"]));
        assert_eq!(
            doc["Properties"]["AssumeRolePolicyDocument"]["Statement"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn role_arn_interpolates_account() {
        let role = ServiceRole::new("orders-api-cfn-role", vec![]);
        assert_eq!(
            role.arn("111111111111"),
            "arn:aws:iam::111111111111:role/orders-api-cfn-role"
        );
    }

    #[test]
    fn group_inlines_its_statements() {
        let stmt = PolicyStatement::allow(&["cloudformation:ValidateTemplate"], vec!["*".into()]);
        let group = DeployGroup::new("orders-api-deployers", vec![stmt.clone()]);
        let doc = group.to_cfn_json();
        assert_eq!(doc["Type"], "AWS::IAM::Group");
        assert_eq!(
            doc["Properties"]["Policies"][0]["PolicyDocument"]["Statement"][0],
            stmt.to_cfn_json()
        );
    }

    #[test]
    fn membership_links_user_to_group() {
        let m = GroupMembership::new("orders-api-deployers", vec!["orders-api-deployer".into()]);
        let doc = m.to_cfn_json();
        assert_eq!(doc["Properties"]["GroupName"], "orders-api-deployers");
        assert_eq!(doc["Properties"]["Users"], json!(["orders-api-deployer"]));
    }
}
