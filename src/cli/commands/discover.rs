//! Discover command - print the referrers of an artifact

use super::required_reference;
use crate::cli::args::{DiscoverArgs, OutputFormat};
use crate::config::Config;
use crate::error::OrcaResult;
use crate::ops::{self, ReferrerNode};
use crate::target::OciLayout;
use serde::Serialize;

/// Execute the discover command
pub async fn execute(args: DiscoverArgs, config: &Config) -> OrcaResult<()> {
    let reference = required_reference(&args.target)?;
    let layout = OciLayout::open_existing(&args.target.path).await?;
    let mode = args.referrers.unwrap_or(config.copy.referrers);

    let tree = ops::discover(
        &layout,
        &reference,
        args.artifact_type.as_deref(),
        mode,
        args.depth,
    )
    .await?;

    match args.format {
        OutputFormat::Tree => print!("{}", render_tree(&tree)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&NodeJson::from(&tree))?),
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeJson {
    digest: String,
    media_type: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact_type: Option<String>,
    referrers: Vec<NodeJson>,
}

impl From<&ReferrerNode> for NodeJson {
    fn from(node: &ReferrerNode) -> Self {
        Self {
            digest: node.descriptor.digest.to_string(),
            media_type: node.descriptor.media_type.clone(),
            size: node.descriptor.size,
            artifact_type: node.descriptor.artifact_type.clone(),
            referrers: node.children.iter().map(NodeJson::from).collect(),
        }
    }
}

fn render_tree(root: &ReferrerNode) -> String {
    let mut out = format!("{}\n", root.descriptor.digest);
    render_children(&root.children, "", &mut out);
    out
}

fn render_children(children: &[ReferrerNode], prefix: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let kind = child
            .descriptor
            .artifact_type
            .as_deref()
            .unwrap_or(&child.descriptor.media_type);
        out.push_str(&format!(
            "{}{} {} {}\n",
            prefix,
            if last { "└──" } else { "├──" },
            kind,
            child.descriptor.digest
        ));
        let nested = format!("{}{}", prefix, if last { "    " } else { "│   " });
        render_children(&child.children, &nested, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Descriptor;

    fn node(content: &[u8], artifact_type: &str, children: Vec<ReferrerNode>) -> ReferrerNode {
        ReferrerNode {
            descriptor: Descriptor::from_bytes("application/vnd.oci.image.manifest.v1+json", content)
                .with_artifact_type(artifact_type),
            children,
        }
    }

    #[test]
    fn tree_rendering() {
        let countersig = node(b"c", "application/vnd.example.countersig", vec![]);
        let sig = node(b"s", "application/vnd.example.sig", vec![countersig]);
        let sbom = node(b"b", "application/vnd.example.sbom", vec![]);
        let root = node(b"r", "application/vnd.example.image", vec![sig, sbom]);

        let rendered = render_tree(&root);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("├── application/vnd.example.sig"));
        assert!(lines[2].starts_with("│   └── application/vnd.example.countersig"));
        assert!(lines[3].starts_with("└── application/vnd.example.sbom"));
    }

    #[test]
    fn json_nests_referrers() {
        let root = node(b"r", "application/vnd.example.image", vec![node(b"s", "application/vnd.example.sig", vec![])]);
        let json = serde_json::to_value(NodeJson::from(&root)).unwrap();
        assert_eq!(json["referrers"][0]["artifactType"], "application/vnd.example.sig");
    }
}
