#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shopcrawl::{
    Capability, CapabilityError, CapabilitySet, FixtureCapability, Pipeline, PipelineControls,
    RuleClassifier, ToolArgs, ToolName,
};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture_capabilities() -> CapabilitySet {
    let catalog = FixtureCapability::from_path(&fixture_path("catalog.json")).unwrap();
    let web = FixtureCapability::from_path(&fixture_path("web.json")).unwrap();
    CapabilitySet::new()
        .with_catalog(Arc::new(catalog))
        .with_web(Arc::new(web))
}

pub fn fixture_pipeline() -> Pipeline {
    Pipeline::new(Arc::new(RuleClassifier), Arc::new(fixture_capabilities()))
}

/// Returns canned results per tool and counts every invocation.
#[derive(Default)]
pub struct Scripted {
    pub catalog: Vec<Value>,
    pub web: Vec<Value>,
    pub fail_catalog: bool,
    pub fail_web: bool,
    pub web_delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl Scripted {
    pub fn new(catalog: Vec<Value>, web: Vec<Value>) -> Self {
        Self {
            catalog,
            web,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capability for Scripted {
    async fn invoke(&self, tool: ToolName, _args: &ToolArgs) -> Result<Vec<Value>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (fail, items) = match tool {
            ToolName::CatalogSearch => (self.fail_catalog, &self.catalog),
            ToolName::WebSearch => {
                if let Some(delay) = self.web_delay {
                    tokio::time::sleep(delay).await;
                }
                (self.fail_web, &self.web)
            }
        };
        if fail {
            return Err(CapabilityError::MalformedResponse {
                tool,
                message: "expected array".into(),
            });
        }
        Ok(items.clone())
    }
}

pub fn scripted_pipeline(capability: Arc<Scripted>) -> Pipeline {
    Pipeline::new(Arc::new(RuleClassifier), capability)
}

pub fn quick_controls() -> PipelineControls {
    PipelineControls::default().with_capability_timeout(Duration::from_millis(100))
}
