use anyhow::Result;
use regex::Regex;
use serde_json::Value as Json;

/// Pre-deploy checks on a rendered bootstrap template. Any failure aborts
/// before the template reaches CloudFormation, so a mis-scoped or partial
/// template is never submitted.
pub struct Policy {
    service_name: String,
    arn_shape: Regex,
}

impl Policy {
    pub fn new(service_name: impl Into<String>) -> Self {
        // arn:partition:service:region:account:resource, region/account may be empty
        let arn_shape = Regex::new(r"^arn:aws:[a-z0-9-]+:[a-z0-9-]*:[0-9]*:.+$")
            .expect("arn shape regex is valid");
        Self { service_name: service_name.into(), arn_shape }
    }

    pub fn check_template(&self, tpl: &Json) -> Result<()> {
        let resources = tpl
            .get("Resources")
            .and_then(|r| r.as_object())
            .ok_or_else(|| anyhow::anyhow!("Policy: template has no Resources section"))?;

        for (id, res) in resources {
            let res_type = res.get("Type").and_then(|t| t.as_str()).unwrap_or_default();
            if res_type == "AWS::IAM::Role" {
                self.check_trust_policy(id, res)?;
            }
            // deploy-time principals must pass one named role, never a pattern;
            // the service role itself manages roles by prefix and is exempt
            let exact_pass_role = res_type == "AWS::IAM::Group" || res_type == "AWS::IAM::User";
            for stmt in inline_statements(res) {
                self.check_statement(id, stmt, exact_pass_role)?;
            }
        }
        Ok(())
    }

    fn check_trust_policy(&self, id: &str, role: &Json) -> Result<()> {
        let stmts = role["Properties"]["AssumeRolePolicyDocument"]["Statement"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        for stmt in &stmts {
            let services = match &stmt["Principal"]["Service"] {
                Json::String(s) => vec![s.clone()],
                Json::Array(a) => a.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
                _ => anyhow::bail!("Policy: role '{}' trust statement has no service principal", id),
            };
            if services.as_slice() != ["cloudformation.amazonaws.com"] {
                anyhow::bail!(
                    "Policy: role '{}' must be assumable by cloudformation.amazonaws.com only, found {:?}",
                    id,
                    services
                );
            }
        }
        if stmts.is_empty() {
            anyhow::bail!("Policy: role '{}' has an empty trust policy", id);
        }
        Ok(())
    }

    fn check_statement(&self, id: &str, stmt: &Json, exact_pass_role: bool) -> Result<()> {
        let actions = as_string_list(&stmt["Action"]);
        let resources = as_string_list(&stmt["Resource"]);
        if actions.is_empty() {
            anyhow::bail!("Policy: '{}' has a statement with no actions", id);
        }
        if resources.is_empty() {
            anyhow::bail!("Policy: '{}' has a statement with no resources", id);
        }
        let passes_role = actions.iter().any(|a| a == "iam:PassRole");
        for res in &resources {
            if exact_pass_role && passes_role && res.contains('*') {
                anyhow::bail!(
                    "Policy: '{}' passes a role with wildcard resource '{}'; PassRole must name one role",
                    id,
                    res
                );
            }
            if res == "*" {
                continue; // only ValidateTemplate legitimately runs unscoped
            }
            if !self.arn_shape.is_match(res) {
                anyhow::bail!("Policy: '{}' has a malformed resource scope '{}'", id, res);
            }
            if !res.contains(&self.service_name) {
                anyhow::bail!(
                    "Policy: '{}' resource scope '{}' is not limited to service '{}'",
                    id,
                    res,
                    self.service_name
                );
            }
        }
        Ok(())
    }
}

fn inline_statements(res: &Json) -> Vec<&Json> {
    let mut out = Vec::new();
    if let Some(policies) = res["Properties"]["Policies"].as_array() {
        for p in policies {
            if let Some(stmts) = p["PolicyDocument"]["Statement"].as_array() {
                out.extend(stmts.iter());
            }
        }
    }
    out
}

fn as_string_list(v: &Json) -> Vec<String> {
    match v {
        Json::String(s) => vec![s.clone()],
        Json::Array(a) => a.iter().filter_map(|x| x.as_str().map(String::from)).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slsboot_bootstrap::BootstrapStack;
    use slsboot_core::ServiceName;

    fn template() -> Json {
        let stack = BootstrapStack::new(
            ServiceName::new("orders-api").unwrap(),
            "111111111111",
            "us-east-1",
        );
        serde_json::to_value(stack.build()).unwrap()
    }

    #[test]
    fn built_template_passes() {
        Policy::new("orders-api").check_template(&template()).unwrap();
    }

    #[test]
    fn wildcard_pass_role_is_rejected() {
        let mut tpl = template();
        let stmts = tpl["Resources"]["DeployGroup"]["Properties"]["Policies"][0]["PolicyDocument"]
            ["Statement"]
            .as_array_mut()
            .unwrap();
        stmts[3]["Resource"] = serde_json::json!(["*"]);
        let err = Policy::new("orders-api").check_template(&tpl).unwrap_err();
        assert!(err.to_string().contains("PassRole"));
    }

    #[test]
    fn foreign_trust_principal_is_rejected() {
        let mut tpl = template();
        tpl["Resources"]["ServiceRole"]["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]
            ["Principal"]["Service"] = serde_json::json!(["ec2.amazonaws.com"]);
        let err = Policy::new("orders-api").check_template(&tpl).unwrap_err();
        assert!(err.to_string().contains("cloudformation.amazonaws.com"));
    }

    #[test]
    fn scope_missing_service_name_is_rejected() {
        let mut tpl = template();
        tpl["Resources"]["DeployGroup"]["Properties"]["Policies"][0]["PolicyDocument"]["Statement"]
            [4]["Resource"] = serde_json::json!(["arn:aws:s3:::someone-elses-bucket*"]);
        let err = Policy::new("orders-api").check_template(&tpl).unwrap_err();
        assert!(err.to_string().contains("not limited to service"));
    }

    #[test]
    fn empty_action_list_is_rejected() {
        let mut tpl = template();
        tpl["Resources"]["DeployGroup"]["Properties"]["Policies"][0]["PolicyDocument"]["Statement"]
            [0]["Action"] = serde_json::json!([]);
        assert!(Policy::new("orders-api").check_template(&tpl).is_err());
    }
}
