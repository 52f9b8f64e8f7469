pub mod cnb;
pub mod delve;
pub mod jdwp;
pub mod netcore;
pub mod node;
pub mod pod;
pub mod ports;
pub mod python;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::image::{ImageConfigLoader, ImageConfiguration, RuntimeType};
use crate::manifest::visitor::group_kind;
use crate::manifest::ManifestList;
use pod::{Container, PodSpec, Volume};
use ports::PortAllocator;

/// Annotation carrying the per-container debug configuration JSON.
pub const DEBUG_CONFIG_ANNOTATION: &str = "debug.cloud.google.com/config";
/// Shared emptyDir volume holding debugger support files.
pub const SUPPORT_VOLUME: &str = "debugging-support-files";
/// Mount point of the support volume in every instrumented container.
pub const SUPPORT_MOUNT: &str = "/dbg";

/// Shim programs that merely wrap an inner command. When one of these is the
/// first entrypoint token, runtime detection must consult the arguments
/// instead.
const DEFAULT_ENTRYPOINT_LAUNCHERS: &[&str] = &[
    "launcher",
    "docker-entrypoint.sh",
    "docker_entrypoint.sh",
    "entrypoint.sh",
    "/cnb/lifecycle/launcher",
];

/// Per-container record serialised into [`DEBUG_CONFIG_ANNOTATION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDebugConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    pub runtime: RuntimeType,
    #[serde(rename = "workingDir", skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub ports: BTreeMap<String, u32>,
}

/// Result of applying one transformer to one container.
#[derive(Debug)]
pub struct Transformation {
    pub configuration: ContainerDebugConfiguration,
    /// Debug-support image under the helpers registry, when the runtime
    /// needs support files installed into `/dbg`.
    pub support_image: Option<&'static str>,
}

/// Read-only registries shared with transformers during a walk.
pub struct TransformContext<'a> {
    pub launchers: &'a [String],
    /// Debugger preference order for runtimes with several (Python).
    pub protocols: &'a [String],
}

impl TransformContext<'_> {
    /// Whether `token` names a known entrypoint-launcher shim.
    pub fn is_launcher(&self, token: &str) -> bool {
        self.launchers.iter().any(|l| l == token)
    }
}

/// `token` invokes `program` either bare or as a path suffix
/// (`java`, `/usr/bin/java`).
pub(crate) fn invokes(token: &str, program: &str) -> bool {
    token == program || token.ends_with(&format!("/{program}"))
}

/// Container-level overrides merged over the image configuration:
/// command/args replace entrypoint/cmd, env entries shadow image env.
pub(crate) fn merge_container_config(
    container: &Container,
    config: &ImageConfiguration,
) -> ImageConfiguration {
    let mut merged = config.clone();
    if let Some(command) = &container.command {
        merged.entrypoint = command.clone();
    }
    if let Some(args) = &container.args {
        merged.arguments = args.clone();
    }
    for env in container.env.iter().flatten() {
        if let Some(value) = &env.value {
            merged.env.insert(env.name.clone(), value.clone());
        }
    }
    merged
}

/// A per-runtime debug transformer: decides applicability from the merged
/// image configuration and rewrites the container to launch under its
/// debugger.
pub trait Transformer: Send + Sync {
    fn runtime(&self) -> RuntimeType;

    fn is_applicable(&self, config: &ImageConfiguration, ctx: &TransformContext) -> bool;

    fn apply(
        &self,
        container: &mut Container,
        config: &ImageConfiguration,
        allocator: &mut PortAllocator,
        ctx: &TransformContext,
    ) -> Result<Transformation>;
}

/// Rewrites workload manifests so each recognised container launches under
/// a language-appropriate debugger.
pub struct DebugEngine {
    transformers: Vec<Box<dyn Transformer>>,
    launchers: Vec<String>,
    helpers_registry: String,
    protocols: Vec<String>,
}

impl DebugEngine {
    /// Build an engine with an explicit transformer sequence. Evaluation
    /// order is the sequence order: the first applicable transformer wins.
    pub fn new(transformers: Vec<Box<dyn Transformer>>, helpers_registry: impl Into<String>) -> Self {
        Self {
            transformers,
            launchers: DEFAULT_ENTRYPOINT_LAUNCHERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            helpers_registry: helpers_registry.into(),
            protocols: Vec::new(),
        }
    }

    /// The standard transformer set. JVM precedes the env-var-driven
    /// runtimes; the order is part of the contract.
    pub fn with_defaults(helpers_registry: impl Into<String>) -> Self {
        Self::new(
            vec![
                Box::new(jdwp::JdwpTransformer),
                Box::new(node::NodeTransformer),
                Box::new(delve::DelveTransformer),
                Box::new(python::PythonTransformer),
                Box::new(netcore::NetcoreTransformer),
            ],
            helpers_registry,
        )
    }

    pub fn with_protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn with_launchers(mut self, launchers: Vec<String>) -> Self {
        self.launchers = launchers;
        self
    }

    /// Instrument every eligible workload in `list`. Documents that cannot
    /// be transformed (unknown kinds, unparseable YAML, per-container
    /// failures) pass through unchanged.
    pub fn transform(
        &self,
        list: &ManifestList,
        loader: &mut dyn ImageConfigLoader,
    ) -> ManifestList {
        let mut out = ManifestList::new();
        for doc in list.iter() {
            match serde_yaml::from_slice::<Value>(doc) {
                Ok(mut parsed) => {
                    if self.transform_document(&mut parsed, loader) {
                        match serde_yaml::to_string(&parsed) {
                            Ok(s) => out.push(s.into_bytes()),
                            Err(err) => {
                                warn!(error = %err, "re-serialising manifest failed, keeping original");
                                out.push(doc.to_vec());
                            }
                        }
                    } else {
                        out.push(doc.to_vec());
                    }
                }
                Err(err) => {
                    warn!(error = %err, "skipping unparseable manifest document");
                    out.push(doc.to_vec());
                }
            }
        }
        out
    }

    fn transform_document(&self, doc: &mut Value, loader: &mut dyn ImageConfigLoader) -> bool {
        let Some((group, kind)) = doc.as_mapping().and_then(group_kind) else {
            return false;
        };
        let template_path: &[&str] = match (group.as_str(), kind.as_str()) {
            ("", "Pod") => &[],
            ("", "List") | ("", "PodList") => {
                return self.transform_list_items(doc, loader);
            }
            ("apps" | "extensions", "Deployment" | "ReplicaSet" | "StatefulSet" | "DaemonSet") => {
                &["spec", "template"]
            }
            ("batch", "Job") => &["spec", "template"],
            ("batch", "CronJob") => &["spec", "jobTemplate", "spec", "template"],
            ("serving.knative.dev", "Service") => &["spec", "template"],
            ("agones.dev", "GameServer") => &["spec", "template"],
            ("agones.dev", "Fleet") => &["spec", "template", "spec", "template"],
            _ => return false,
        };

        let Some(template) = mapping_at(doc, template_path) else {
            return false;
        };
        let changed = self.transform_pod_template(template, loader);
        if changed {
            suppress_replicas(doc, &group, &kind);
        }
        changed
    }

    fn transform_list_items(&self, doc: &mut Value, loader: &mut dyn ImageConfigLoader) -> bool {
        let Some(items) = doc
            .as_mapping_mut()
            .and_then(|m| m.get_mut("items"))
            .and_then(Value::as_sequence_mut)
        else {
            return false;
        };
        let mut changed = false;
        for item in items.iter_mut() {
            let item_changed = if item
                .as_mapping()
                .is_some_and(|m| m.contains_key("kind"))
            {
                self.transform_document(item, loader)
            } else {
                // Typed list items may omit apiVersion/kind; treat them as
                // pods, the only list the engine is handed in practice.
                match mapping_at(item, &[]) {
                    Some(template) => self.transform_pod_template(template, loader),
                    None => false,
                }
            };
            changed |= item_changed;
        }
        changed
    }

    fn transform_pod_template(
        &self,
        template: &mut Mapping,
        loader: &mut dyn ImageConfigLoader,
    ) -> bool {
        if has_debug_annotation(template) {
            debug!("pod template already instrumented, skipping");
            return false;
        }
        let Some(spec_value) = template.get_mut("spec") else {
            return false;
        };
        let mut spec: PodSpec = match serde_yaml::from_value(spec_value.clone()) {
            Ok(spec) => spec,
            Err(err) => {
                warn!(error = %err, "unparseable pod spec, leaving untouched");
                return false;
            }
        };

        let mut allocator = PortAllocator::for_pod(&spec);
        let mut configurations: BTreeMap<String, ContainerDebugConfiguration> = BTreeMap::new();
        let mut support_images: BTreeSet<&'static str> = BTreeSet::new();

        for container in &mut spec.containers {
            let image = container.image.clone().unwrap_or_default();
            let config = if image.is_empty() {
                ImageConfiguration::default()
            } else {
                match loader.load(&image) {
                    Ok(config) => config,
                    Err(err) => {
                        warn!(container = %container.name, error = %err, "skipping container");
                        continue;
                    }
                }
            };
            let merged = merge_container_config(container, &config);
            let saved = container.clone();
            match self.transform_container(container, &image, &merged, &mut allocator) {
                Ok(transformation) => {
                    if let Some(support) = transformation.support_image {
                        support_images.insert(support);
                        container.ensure_volume_mount(SUPPORT_VOLUME, SUPPORT_MOUNT);
                    }
                    configurations.insert(container.name.clone(), transformation.configuration);
                }
                Err(err) => {
                    *container = saved;
                    warn!(container = %container.name, error = %err, "container left unchanged");
                }
            }
        }

        if configurations.is_empty() {
            return false;
        }

        if !support_images.is_empty() {
            let volumes = spec.volumes.get_or_insert_with(Vec::new);
            if !volumes.iter().any(|v| v.name == SUPPORT_VOLUME) {
                volumes.push(Volume::empty_dir(SUPPORT_VOLUME));
            }
            let init_containers = spec.init_containers.get_or_insert_with(Vec::new);
            for lang in &support_images {
                let name = format!("install-{lang}-support");
                if init_containers.iter().any(|c| c.name == name) {
                    continue;
                }
                let mut install = Container {
                    name,
                    image: Some(format!("{}/{lang}", self.helpers_registry)),
                    ..Default::default()
                };
                install.ensure_volume_mount(SUPPORT_VOLUME, SUPPORT_MOUNT);
                init_containers.push(install);
            }
        }

        match serde_yaml::to_value(&spec) {
            Ok(value) => *spec_value = value,
            Err(err) => {
                warn!(error = %err, "re-serialising pod spec failed, leaving untouched");
                return false;
            }
        }
        set_debug_annotation(template, &configurations);
        true
    }

    fn transform_container(
        &self,
        container: &mut Container,
        image: &str,
        merged: &ImageConfiguration,
        allocator: &mut PortAllocator,
    ) -> Result<Transformation> {
        let ctx = TransformContext {
            launchers: &self.launchers,
            protocols: &self.protocols,
        };
        if cnb::is_cnb_image(merged) {
            return cnb::update_for_cnb_image(container, image, merged, |c, ic| {
                self.dispatch(c, image, ic, allocator, &ctx)
            });
        }
        self.dispatch(container, image, merged, allocator, &ctx)
    }

    fn dispatch(
        &self,
        container: &mut Container,
        image: &str,
        config: &ImageConfiguration,
        allocator: &mut PortAllocator,
        ctx: &TransformContext,
    ) -> Result<Transformation> {
        for transformer in &self.transformers {
            if transformer.is_applicable(config, ctx) {
                debug!(
                    container = %container.name,
                    runtime = %transformer.runtime(),
                    "instrumenting container"
                );
                return transformer.apply(container, config, allocator, ctx);
            }
        }
        Err(Error::DebugUnsupported {
            container: container.name.clone(),
            image: image.to_string(),
        })
    }
}

fn mapping_at<'a>(doc: &'a mut Value, path: &[&str]) -> Option<&'a mut Mapping> {
    let mut current = doc;
    for key in path {
        current = current.as_mapping_mut()?.get_mut(*key)?;
    }
    current.as_mapping_mut()
}

fn has_debug_annotation(template: &Mapping) -> bool {
    template
        .get("metadata")
        .and_then(Value::as_mapping)
        .and_then(|m| m.get("annotations"))
        .and_then(Value::as_mapping)
        .is_some_and(|a| a.contains_key(DEBUG_CONFIG_ANNOTATION))
}

fn set_debug_annotation(
    template: &mut Mapping,
    configurations: &BTreeMap<String, ContainerDebugConfiguration>,
) {
    let json = match serde_json::to_string(configurations) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "serialising debug configuration failed");
            return;
        }
    };
    let metadata_key = Value::from("metadata");
    if !matches!(template.get(&metadata_key), Some(Value::Mapping(_))) {
        template.insert(metadata_key.clone(), Value::Mapping(Mapping::new()));
    }
    let metadata = template
        .get_mut(&metadata_key)
        .and_then(Value::as_mapping_mut)
        .expect("metadata mapping was just ensured");
    let annotations_key = Value::from("annotations");
    if !matches!(metadata.get(&annotations_key), Some(Value::Mapping(_))) {
        metadata.insert(annotations_key.clone(), Value::Mapping(Mapping::new()));
    }
    metadata
        .get_mut(&annotations_key)
        .and_then(Value::as_mapping_mut)
        .expect("annotations mapping was just ensured")
        .insert(Value::from(DEBUG_CONFIG_ANNOTATION), Value::from(json));
}

/// Debugging expects a single replica; scale down workloads that ask for
/// more.
fn suppress_replicas(doc: &mut Value, group: &str, kind: &str) {
    let has_replicas = matches!(
        (group, kind),
        ("apps" | "extensions", "Deployment" | "ReplicaSet" | "StatefulSet")
            | ("agones.dev", "Fleet")
    );
    if !has_replicas {
        return;
    }
    if let Some(spec) = mapping_at(doc, &["spec"]) {
        let key = Value::from("replicas");
        if spec
            .get(&key)
            .and_then(Value::as_u64)
            .is_some_and(|r| r > 1)
        {
            spec.insert(key, Value::from(1u64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapLoader(HashMap<String, ImageConfiguration>);

    impl MapLoader {
        fn empty() -> Self {
            Self(HashMap::new())
        }
    }

    impl ImageConfigLoader for MapLoader {
        fn load(&mut self, image: &str) -> Result<ImageConfiguration> {
            Ok(self.0.get(image).cloned().unwrap_or_default())
        }
    }

    fn engine() -> DebugEngine {
        DebugEngine::with_defaults("gcr.io/gcp-dev-tools/duct-tape")
    }

    fn transform(yaml: &str) -> String {
        let mut list = ManifestList::new();
        list.append(yaml.as_bytes());
        engine()
            .transform(&list, &mut MapLoader::empty())
            .to_string()
    }

    const JVM_POD: &str = concat!(
        "apiVersion: v1\n",
        "kind: Pod\n",
        "metadata:\n",
        "  name: p\n",
        "spec:\n",
        "  containers:\n",
        "  - name: t\n",
        "    command: [java, -jar, f.jar]\n",
    );

    #[test]
    fn jvm_pod_gains_agent_env_port_and_annotation() {
        let out = transform(JVM_POD);
        assert!(out.contains("JAVA_TOOL_OPTIONS"));
        assert!(out.contains(
            "-agentlib:jdwp=transport=dt_socket,server=y,address=5005,suspend=n,quiet=y"
        ));
        assert!(out.contains("containerPort: 5005"));
        assert!(out.contains(r#"{"t":{"runtime":"jvm","ports":{"jdwp":5005}}}"#));
        // No support image for the JVM: no volume, no init container.
        assert!(!out.contains(SUPPORT_VOLUME));
    }

    #[test]
    fn debug_transform_is_idempotent() {
        let once = transform(JVM_POD);
        let twice = transform(&once);
        assert_eq!(once, twice);
    }

    const GO_DEPLOYMENT: &str = concat!(
        "apiVersion: apps/v1\n",
        "kind: Deployment\n",
        "metadata:\n",
        "  name: d\n",
        "spec:\n",
        "  replicas: 2\n",
        "  template:\n",
        "    metadata:\n",
        "      labels:\n",
        "        app: d\n",
        "    spec:\n",
        "      containers:\n",
        "      - name: t\n",
        "        command: [app, arg]\n",
        "        env:\n",
        "        - name: GOMAXPROCS\n",
        "          value: '1'\n",
    );

    #[test]
    fn go_deployment_gets_dlv_launcher_and_single_replica() {
        let out = transform(GO_DEPLOYMENT);
        assert!(out.contains("replicas: 1"));
        assert!(out.contains("/dbg/go/bin/dlv"));
        assert!(out.contains("--listen=:56268"));
        assert!(out.contains("--api-version=2"));
        assert!(out.contains(r#"{"t":{"runtime":"go","ports":{"dlv":56268}}}"#));
        assert!(out.contains("install-go-support"));
        assert!(out.contains("image: gcr.io/gcp-dev-tools/duct-tape/go"));
        assert!(out.contains(SUPPORT_VOLUME));
        assert!(out.contains("mountPath: /dbg"));
    }

    #[test]
    fn go_command_shape_matches_dlv_exec() {
        let out = transform(GO_DEPLOYMENT);
        let parsed: Value = serde_yaml::from_str(&out).unwrap();
        let command: Vec<String> = serde_yaml::from_value(
            parsed["spec"]["template"]["spec"]["containers"][0]["command"].clone(),
        )
        .unwrap();
        assert_eq!(
            command,
            [
                "/dbg/go/bin/dlv",
                "exec",
                "--headless",
                "--continue",
                "--accept-multiclient",
                "--listen=:56268",
                "--api-version=2",
                "app",
                "--",
                "arg",
            ]
            .map(String::from)
        );
    }

    const MIXED_POD_LIST: &str = concat!(
        "apiVersion: v1\n",
        "kind: PodList\n",
        "items:\n",
        "- apiVersion: v1\n",
        "  kind: Pod\n",
        "  metadata:\n",
        "    name: shell\n",
        "  spec:\n",
        "    containers:\n",
        "    - name: echo\n",
        "      command: [echo, Hello World]\n",
        "- apiVersion: v1\n",
        "  kind: Pod\n",
        "  metadata:\n",
        "    name: web\n",
        "  spec:\n",
        "    containers:\n",
        "    - name: web\n",
        "      command: [node, server.js]\n",
    );

    #[test]
    fn pod_list_transforms_only_recognised_containers() {
        let out = transform(MIXED_POD_LIST);
        assert!(out.contains("--inspect=0.0.0.0:9229"));
        assert!(out.contains("devtools"));
        assert!(out.contains("/dbg/nodejs/bin"));
        assert!(out.contains("install-nodejs-support"));
        // The echo pod is untouched: no annotation near it, command intact.
        assert!(out.contains("- echo\n"));
        assert_eq!(out.matches(DEBUG_CONFIG_ANNOTATION).count(), 1);
    }

    #[test]
    fn unsupported_pod_left_byte_identical() {
        let yaml = concat!(
            "apiVersion: v1\n",
            "kind: Pod\n",
            "metadata:\n",
            "  name: p\n",
            "spec:\n",
            "  containers:\n",
            "  - name: sh\n",
            "    command: [sh, -c, sleep infinity]\n",
        );
        let mut list = ManifestList::new();
        list.append(yaml.as_bytes());
        let out = engine().transform(&list, &mut MapLoader::empty());
        assert_eq!(out.to_string(), list.to_string());
    }

    #[test]
    fn ports_do_not_collide_across_containers() {
        let yaml = concat!(
            "apiVersion: v1\n",
            "kind: Pod\n",
            "metadata:\n",
            "  name: p\n",
            "spec:\n",
            "  containers:\n",
            "  - name: a\n",
            "    command: [java, -jar, a.jar]\n",
            "  - name: b\n",
            "    command: [java, -jar, b.jar]\n",
            "  - name: c\n",
            "    ports:\n",
            "    - containerPort: 5007\n",
            "    command: [java, -jar, c.jar]\n",
        );
        let out = transform(yaml);
        assert!(out.contains(r#""a":{"runtime":"jvm","ports":{"jdwp":5005}}"#));
        assert!(out.contains(r#""b":{"runtime":"jvm","ports":{"jdwp":5006}}"#));
        // 5007 is declared in the original manifest, so c gets 5008.
        assert!(out.contains(r#""c":{"runtime":"jvm","ports":{"jdwp":5008}}"#));
    }

    #[test]
    fn cronjob_template_is_instrumented() {
        let yaml = concat!(
            "apiVersion: batch/v1\n",
            "kind: CronJob\n",
            "metadata:\n",
            "  name: cj\n",
            "spec:\n",
            "  schedule: '* * * * *'\n",
            "  jobTemplate:\n",
            "    spec:\n",
            "      template:\n",
            "        spec:\n",
            "          containers:\n",
            "          - name: t\n",
            "            command: [java, -jar, f.jar]\n",
        );
        let out = transform(yaml);
        assert!(out.contains(DEBUG_CONFIG_ANNOTATION));
        assert!(out.contains("JAVA_TOOL_OPTIONS"));
    }

    #[test]
    fn knative_service_template_is_instrumented() {
        let yaml = concat!(
            "apiVersion: serving.knative.dev/v1\n",
            "kind: Service\n",
            "metadata:\n",
            "  name: svc\n",
            "spec:\n",
            "  template:\n",
            "    spec:\n",
            "      containers:\n",
            "      - name: t\n",
            "        command: [java, -jar, f.jar]\n",
        );
        let out = transform(yaml);
        assert!(out.contains(DEBUG_CONFIG_ANNOTATION));
    }

    #[test]
    fn agones_fleet_nested_template_and_replicas() {
        let yaml = concat!(
            "apiVersion: agones.dev/v1\n",
            "kind: Fleet\n",
            "metadata:\n",
            "  name: f\n",
            "spec:\n",
            "  replicas: 3\n",
            "  template:\n",
            "    spec:\n",
            "      template:\n",
            "        spec:\n",
            "          containers:\n",
            "          - name: t\n",
            "            command: [java, -jar, f.jar]\n",
        );
        let out = transform(yaml);
        assert!(out.contains(DEBUG_CONFIG_ANNOTATION));
        assert!(out.contains("replicas: 1"));
    }

    #[test]
    fn extensions_alias_deployment_is_instrumented() {
        let yaml = concat!(
            "apiVersion: extensions/v1beta1\n",
            "kind: Deployment\n",
            "metadata:\n",
            "  name: d\n",
            "spec:\n",
            "  replicas: 2\n",
            "  template:\n",
            "    spec:\n",
            "      containers:\n",
            "      - name: t\n",
            "        command: [java, -jar, f.jar]\n",
        );
        let out = transform(yaml);
        assert!(out.contains(DEBUG_CONFIG_ANNOTATION));
        assert!(out.contains("replicas: 1"));
    }

    #[test]
    fn daemonset_has_no_replicas_to_suppress() {
        let yaml = concat!(
            "apiVersion: apps/v1\n",
            "kind: DaemonSet\n",
            "metadata:\n",
            "  name: ds\n",
            "spec:\n",
            "  template:\n",
            "    spec:\n",
            "      containers:\n",
            "      - name: t\n",
            "        command: [java, -jar, f.jar]\n",
        );
        let out = transform(yaml);
        assert!(out.contains(DEBUG_CONFIG_ANNOTATION));
        assert!(!out.contains("replicas"));
    }

    #[test]
    fn unknown_kind_is_not_touched() {
        let yaml = concat!(
            "apiVersion: v1\n",
            "kind: Service\n",
            "metadata:\n",
            "  name: svc\n",
            "spec:\n",
            "  selector:\n",
            "    app: web\n",
        );
        let out = transform(yaml);
        assert!(!out.contains(DEBUG_CONFIG_ANNOTATION));
    }

    #[test]
    fn already_annotated_deployment_is_skipped() {
        let yaml = concat!(
            "apiVersion: apps/v1\n",
            "kind: Deployment\n",
            "metadata:\n",
            "  name: d\n",
            "spec:\n",
            "  replicas: 2\n",
            "  template:\n",
            "    metadata:\n",
            "      annotations:\n",
            "        debug.cloud.google.com/config: '{\"t\":{\"runtime\":\"jvm\"}}'\n",
            "    spec:\n",
            "      containers:\n",
            "      - name: t\n",
            "        command: [java, -jar, f.jar]\n",
        );
        let out = transform(yaml);
        // Untouched: replicas stay at 2, no JDWP env injected.
        assert!(out.contains("replicas: 2"));
        assert!(!out.contains("JAVA_TOOL_OPTIONS"));
    }

    #[test]
    fn runtime_override_from_image_config() {
        let yaml = concat!(
            "apiVersion: v1\n",
            "kind: Pod\n",
            "metadata:\n",
            "  name: p\n",
            "spec:\n",
            "  containers:\n",
            "  - name: t\n",
            "    image: example:TAG\n",
            "    command: [./server]\n",
        );
        let mut configs = HashMap::new();
        configs.insert(
            "example:TAG".to_string(),
            ImageConfiguration {
                artifact: Some("example".to_string()),
                runtime: Some(RuntimeType::Go),
                ..Default::default()
            },
        );
        let mut list = ManifestList::new();
        list.append(yaml.as_bytes());
        let out = engine()
            .transform(&list, &mut MapLoader(configs))
            .to_string();
        assert!(out.contains("/dbg/go/bin/dlv"));
        assert!(out.contains(r#""artifact":"example""#));
    }
}
