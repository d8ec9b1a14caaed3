use anyhow::{Context, Result};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

fn aws() -> Result<String> {
    let p = which::which("aws").context("aws cli not found in PATH")?;
    Ok(p.to_string_lossy().into_owned())
}

/// Deploy a rendered template file as a named stack. IAM resources carry
/// explicit names, so the named-IAM capability is always requested.
pub fn deploy_stack(stack_name: &str, template_path: &Path, region: Option<&str>) -> Result<()> {
    let aws = aws()?;
    let mut cmd = Command::new(aws);
    cmd.arg("cloudformation").arg("deploy")
        .arg("--stack-name").arg(stack_name)
        .arg("--template-file").arg(template_path)
        .arg("--capabilities").arg("CAPABILITY_NAMED_IAM");
    if let Some(r) = region { cmd.arg("--region").arg(r); }
    let st = cmd.status().context("spawn aws cloudformation deploy")?;
    if !st.success() { anyhow::bail!("cloudformation deploy failed") }
    Ok(())
}

pub fn delete_stack(stack_name: &str, region: Option<&str>) -> Result<()> {
    let aws = aws()?;
    let mut cmd = Command::new(aws);
    cmd.arg("cloudformation").arg("delete-stack")
        .arg("--stack-name").arg(stack_name);
    if let Some(r) = region { cmd.arg("--region").arg(r); }
    let st = cmd.status().context("aws cloudformation delete-stack")?;
    if !st.success() { anyhow::bail!("cloudformation delete-stack failed") }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CfnExport {
    #[serde(rename="Name")] pub name: String,
}

/// A named value exported from the template. Export names must be unique per
/// account/region; renaming one is a breaking change for downstream stacks.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CfnOutput {
    #[serde(rename="Value")] pub value: Json,
    #[serde(rename="Description", skip_serializing_if="Option::is_none")]
    pub description: Option<String>,
    #[serde(rename="Export", skip_serializing_if="Option::is_none")]
    pub export: Option<CfnExport>,
}

impl CfnOutput {
    pub fn new(value: impl Into<Json>, description: impl Into<String>) -> Self {
        Self { value: value.into(), description: Some(description.into()), export: None }
    }

    pub fn exported(mut self, name: impl Into<String>) -> Self {
        self.export = Some(CfnExport { name: name.into() });
        self
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CfnTemplate {
    #[serde(rename="AWSTemplateFormatVersion")] pub version: Option<String>,
    #[serde(rename="Description")] pub description: Option<String>,
    #[serde(rename="Resources")] pub resources: BTreeMap<String, Json>,
    #[serde(rename="Outputs", default, skip_serializing_if="BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, CfnOutput>,
}

impl CfnTemplate {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            version: Some("2010-09-09".to_string()),
            description: Some(description.into()),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn resource(&mut self, logical_id: impl Into<String>, body: Json) -> &mut Self {
        self.resources.insert(logical_id.into(), body);
        self
    }

    pub fn output(&mut self, name: impl Into<String>, output: CfnOutput) -> &mut Self {
        self.outputs.insert(name.into(), output);
        self
    }

    pub fn write_json(&self, out_dir: &Path) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("create output directory {}", out_dir.display()))?;
        let path = out_dir.join("bootstrap.template.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
