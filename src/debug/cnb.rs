//! Cloud Native Buildpacks launcher normalisation.
//!
//! CNB images do not carry their real command line in entrypoint/cmd: the
//! entrypoint is the lifecycle launcher (or a per-process symlink) and the
//! actual processes live in the `io.buildpacks.build.metadata` label. This
//! module resolves the effective process into a plain command line, runs the
//! ordinary debug transform over it, and folds the transformed command line
//! back into launcher-compatible container args.

use serde::Deserialize;

use crate::debug::pod::Container;
use crate::debug::Transformation;
use crate::errors::{Error, Result};
use crate::image::ImageConfiguration;

const CNB_LAUNCHER: &str = "/cnb/lifecycle/launcher";
const PROCESS_ENTRYPOINT_PREFIX: &str = "/cnb/process/";
const STACK_ID_LABEL: &str = "io.buildpacks.stack.id";
const BUILD_METADATA_LABEL: &str = "io.buildpacks.build.metadata";
const DEFAULT_PROCESS_TYPE: &str = "web";

#[derive(Debug, Deserialize)]
struct BuildMetadata {
    #[serde(default)]
    processes: Vec<CnbProcess>,
}

#[derive(Debug, Clone, Deserialize)]
struct CnbProcess {
    #[serde(rename = "type", default)]
    process_type: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    direct: bool,
}

/// How to restore the transformed command line into launcher args.
enum Rewrite {
    /// `args[0] = "--"` followed by the exec'd command line.
    Direct,
    /// A single shell-quoted command string followed by positional args.
    Script { trailing: Vec<String> },
}

/// Whether the merged configuration describes a CNB image whose entrypoint
/// is the lifecycle launcher or a per-process symlink.
pub(crate) fn is_cnb_image(config: &ImageConfiguration) -> bool {
    config.labels.contains_key(STACK_ID_LABEL)
        && config.entrypoint.first().is_some_and(|entrypoint| {
            entrypoint == CNB_LAUNCHER || entrypoint.starts_with(PROCESS_ENTRYPOINT_PREFIX)
        })
}

/// Normalise the container's command line, apply `transform` to the
/// normalised view, then rewrite the container args back into the form the
/// CNB launcher expects.
pub(crate) fn update_for_cnb_image<F>(
    container: &mut Container,
    image: &str,
    config: &ImageConfiguration,
    transform: F,
) -> Result<Transformation>
where
    F: FnOnce(&mut Container, &ImageConfiguration) -> Result<Transformation>,
{
    let metadata_json =
        config
            .labels
            .get(BUILD_METADATA_LABEL)
            .ok_or_else(|| Error::CnbMetadataMissing {
                image: image.to_string(),
            })?;
    let metadata: BuildMetadata =
        serde_json::from_str(metadata_json).map_err(|source| Error::CnbMetadataInvalid {
            image: image.to_string(),
            source,
        })?;
    if metadata.processes.is_empty() {
        return Err(Error::CnbNoProcesses {
            image: image.to_string(),
        });
    }

    // Per-process symlinks (platform API 0.4+) need the generic launcher to
    // run a modified command line.
    let needs_launcher_entrypoint = config.entrypoint.first().map(String::as_str) != Some(CNB_LAUNCHER);

    let (mut normalized, rewrite) = adjust_command_line(&metadata, config, image)?;
    normalized.working_dir = config
        .env
        .get("CNB_APP_DIR")
        .cloned()
        .unwrap_or_else(|| "/workspace".to_string());

    let args_before = container.args.clone();
    let transformation = transform(container, &normalized)?;
    let mut configuration = transformation.configuration;
    if configuration.working_dir.is_none() {
        configuration.working_dir = Some(normalized.working_dir.clone());
    }
    if container.working_dir.is_none() {
        container.working_dir = Some(normalized.working_dir.clone());
    }

    // The transformer writes a plain command line into container args when
    // it rewrites one; untouched args are still in launcher form and must
    // be replaced by the normalised command line.
    let transformed = match &container.args {
        Some(args) if *args != args_before.unwrap_or_default() => args.clone(),
        _ => normalized.arguments.clone(),
    };
    let restored = match rewrite {
        Rewrite::Direct => {
            let mut args = vec!["--".to_string()];
            args.extend(transformed);
            args
        }
        Rewrite::Script { trailing } => {
            let mut args = vec![shell_words::join(&transformed)];
            args.extend(trailing);
            args
        }
    };
    if needs_launcher_entrypoint {
        container.command = Some(vec![CNB_LAUNCHER.to_string()]);
    }
    container.args = Some(restored);

    Ok(Transformation {
        configuration,
        support_image: transformation.support_image,
    })
}

/// Resolve the effective command line per the launcher's own rules and
/// return it as a configuration whose entrypoint is the (skipped) launcher
/// and whose arguments are the plain command line.
fn adjust_command_line(
    metadata: &BuildMetadata,
    config: &ImageConfiguration,
    image: &str,
) -> Result<(ImageConfiguration, Rewrite)> {
    let is_launcher_entrypoint =
        config.entrypoint.first().map(String::as_str) == Some(CNB_LAUNCHER);

    if is_launcher_entrypoint {
        if config.arguments.first().map(String::as_str) == Some("--") {
            // Direct exec: the args after `--` are the command line.
            return Ok(unwrap_command_line(
                config,
                config.arguments[1..].to_vec(),
                Vec::new(),
            ));
        }
        if config.arguments.len() == 1 {
            if let Some(process) = find_process(metadata, &config.arguments[0]) {
                return Ok(resolve_process(config, process, Vec::new()));
            }
        }
    } else if let Some(process_type) = config
        .entrypoint
        .first()
        .and_then(|e| e.strip_prefix(PROCESS_ENTRYPOINT_PREFIX))
    {
        let process = find_process(metadata, process_type).ok_or_else(|| {
            Error::CnbProcessUnresolved {
                image: image.to_string(),
                process: process_type.to_string(),
            }
        })?;
        // Container args are positional arguments to the process.
        return Ok(resolve_process(config, process, config.arguments.clone()));
    }

    let fallback = config
        .env
        .get("CNB_PROCESS_TYPE")
        .map(String::as_str)
        .unwrap_or(DEFAULT_PROCESS_TYPE);
    let process =
        find_process(metadata, fallback).ok_or_else(|| Error::CnbProcessUnresolved {
            image: image.to_string(),
            process: fallback.to_string(),
        })?;
    Ok(resolve_process(config, process, Vec::new()))
}

fn find_process<'a>(metadata: &'a BuildMetadata, process_type: &str) -> Option<&'a CnbProcess> {
    metadata
        .processes
        .iter()
        .find(|p| p.process_type == process_type)
}

fn resolve_process(
    config: &ImageConfiguration,
    process: &CnbProcess,
    positional: Vec<String>,
) -> (ImageConfiguration, Rewrite) {
    if process.direct {
        let mut command_line = vec![process.command.clone()];
        command_line.extend(process.args.iter().cloned());
        command_line.extend(positional);
        unwrap_command_line(config, command_line, Vec::new())
    } else {
        let mut trailing = process.args.clone();
        trailing.extend(positional);
        let tokens = shell_words::split(&process.command).unwrap_or_else(|_| vec![process.command.clone()]);
        (
            normalized(config, tokens),
            Rewrite::Script { trailing },
        )
    }
}

/// A direct command line that is really `sh -c <script> [args…]` is treated
/// as the script it wraps.
fn unwrap_command_line(
    config: &ImageConfiguration,
    command_line: Vec<String>,
    mut trailing: Vec<String>,
) -> (ImageConfiguration, Rewrite) {
    if command_line.len() >= 3 && is_sh_dash_c(&command_line[0], &command_line[1]) {
        let tokens = shell_words::split(&command_line[2])
            .unwrap_or_else(|_| vec![command_line[2].clone()]);
        trailing.extend(command_line[3..].iter().cloned());
        return (normalized(config, tokens), Rewrite::Script { trailing });
    }
    (normalized(config, command_line), Rewrite::Direct)
}

fn is_sh_dash_c(command: &str, flag: &str) -> bool {
    flag == "-c" && matches!(command, "/bin/sh" | "/bin/bash" | "sh" | "bash")
}

fn normalized(config: &ImageConfiguration, arguments: Vec<String>) -> ImageConfiguration {
    let mut ic = config.clone();
    ic.entrypoint = vec![CNB_LAUNCHER.to_string()];
    ic.arguments = arguments;
    ic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::ports::PortAllocator;
    use crate::debug::{DebugEngine, TransformContext, Transformer, DEBUG_CONFIG_ANNOTATION};
    use crate::image::ImageConfigLoader;
    use crate::manifest::ManifestList;
    use std::collections::HashMap;

    fn cnb_config(entrypoint: &str, args: &[&str], metadata: &str) -> ImageConfiguration {
        let mut config = ImageConfiguration {
            entrypoint: vec![entrypoint.to_string()],
            arguments: args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        config
            .labels
            .insert(STACK_ID_LABEL.to_string(), "io.buildpacks.stacks.jammy".to_string());
        config
            .labels
            .insert(BUILD_METADATA_LABEL.to_string(), metadata.to_string());
        config
    }

    const JAVA_WEB_METADATA: &str =
        r#"{"processes":[{"type":"web","command":"java","args":["-jar","app.jar"],"direct":true}]}"#;

    fn engine() -> DebugEngine {
        DebugEngine::with_defaults("registry.example/helpers")
    }

    struct MapLoader(HashMap<String, ImageConfiguration>);

    impl ImageConfigLoader for MapLoader {
        fn load(&mut self, image: &str) -> Result<ImageConfiguration> {
            Ok(self.0.get(image).cloned().unwrap_or_default())
        }
    }

    fn transform_pod(image_config: ImageConfiguration) -> String {
        let yaml = concat!(
            "apiVersion: v1\n",
            "kind: Pod\n",
            "metadata:\n",
            "  name: p\n",
            "spec:\n",
            "  containers:\n",
            "  - name: t\n",
            "    image: cnb/app\n",
        );
        let mut list = ManifestList::new();
        list.append(yaml.as_bytes());
        let mut loader = MapLoader(HashMap::from([("cnb/app".to_string(), image_config)]));
        engine().transform(&list, &mut loader).to_string()
    }

    #[test]
    fn detects_cnb_images() {
        let config = cnb_config(CNB_LAUNCHER, &[], JAVA_WEB_METADATA);
        assert!(is_cnb_image(&config));
        let per_process = cnb_config("/cnb/process/web", &[], JAVA_WEB_METADATA);
        assert!(is_cnb_image(&per_process));

        let mut not_cnb = config.clone();
        not_cnb.labels.remove(STACK_ID_LABEL);
        assert!(!is_cnb_image(&not_cnb));
        let plain = ImageConfiguration {
            entrypoint: vec!["java".to_string()],
            ..Default::default()
        };
        assert!(!is_cnb_image(&plain));
    }

    #[test]
    fn direct_web_process_transforms_and_restores_dashdash() {
        let out = transform_pod(cnb_config(CNB_LAUNCHER, &[], JAVA_WEB_METADATA));
        assert!(out.contains("JAVA_TOOL_OPTIONS"));
        assert!(out.contains(DEBUG_CONFIG_ANNOTATION));
        assert!(out.contains(r#""runtime":"jvm""#));
        assert!(out.contains(r#""workingDir":"/workspace""#));
        // Restored args: `--` then the exec'd command line.
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let args: Vec<String> = serde_yaml::from_value(
            parsed["spec"]["containers"][0]["args"].clone(),
        )
        .unwrap();
        assert_eq!(args, ["--", "java", "-jar", "app.jar"].map(String::from));
        assert_eq!(parsed["spec"]["containers"][0]["workingDir"], "/workspace");
    }

    #[test]
    fn cnb_app_dir_overrides_working_dir() {
        let mut config = cnb_config(CNB_LAUNCHER, &[], JAVA_WEB_METADATA);
        config
            .env
            .insert("CNB_APP_DIR".to_string(), "/srv/app".to_string());
        let out = transform_pod(config);
        assert!(out.contains(r#""workingDir":"/srv/app""#));
    }

    #[test]
    fn per_process_entrypoint_switches_to_generic_launcher() {
        let config = cnb_config("/cnb/process/web", &[], JAVA_WEB_METADATA);
        let out = transform_pod(config);
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let command: Vec<String> = serde_yaml::from_value(
            parsed["spec"]["containers"][0]["command"].clone(),
        )
        .unwrap();
        assert_eq!(command, [CNB_LAUNCHER].map(String::from));
    }

    #[test]
    fn direct_exec_args_reuse_command_line() {
        let config = cnb_config(CNB_LAUNCHER, &["--", "java", "-jar", "app.jar"], "{\"processes\":[{\"type\":\"other\",\"command\":\"x\",\"direct\":true}]}");
        let out = transform_pod(config);
        assert!(out.contains("JAVA_TOOL_OPTIONS"));
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let args: Vec<String> = serde_yaml::from_value(
            parsed["spec"]["containers"][0]["args"].clone(),
        )
        .unwrap();
        assert_eq!(args, ["--", "java", "-jar", "app.jar"].map(String::from));
    }

    #[test]
    fn script_process_is_shell_split_and_rejoined() {
        let metadata = r#"{"processes":[{"type":"web","command":"node server.js","args":["--host"],"direct":false}]}"#;
        let config = cnb_config(CNB_LAUNCHER, &[], metadata);
        let out = transform_pod(config);
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let args: Vec<String> = serde_yaml::from_value(
            parsed["spec"]["containers"][0]["args"].clone(),
        )
        .unwrap();
        assert_eq!(
            args,
            [
                "node --inspect=0.0.0.0:9229 server.js",
                "--host"
            ]
            .map(String::from)
        );
    }

    #[test]
    fn sh_dash_c_direct_process_unwrapped_as_script() {
        let metadata = r#"{"processes":[{"type":"web","command":"/bin/sh","args":["-c","node server.js"],"direct":true}]}"#;
        let config = cnb_config(CNB_LAUNCHER, &[], metadata);
        let out = transform_pod(config);
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let args: Vec<String> = serde_yaml::from_value(
            parsed["spec"]["containers"][0]["args"].clone(),
        )
        .unwrap();
        assert_eq!(args, ["node --inspect=0.0.0.0:9229 server.js"].map(String::from));
    }

    #[test]
    fn process_type_argument_selects_process() {
        let metadata = r#"{"processes":[{"type":"worker","command":"java","args":["-jar","worker.jar"],"direct":true},{"type":"web","command":"java","args":["-jar","web.jar"],"direct":true}]}"#;
        let config = cnb_config(CNB_LAUNCHER, &["worker"], metadata);
        let out = transform_pod(config);
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let args: Vec<String> = serde_yaml::from_value(
            parsed["spec"]["containers"][0]["args"].clone(),
        )
        .unwrap();
        assert_eq!(args, ["--", "java", "-jar", "worker.jar"].map(String::from));
    }

    #[test]
    fn cnb_process_type_env_selects_fallback() {
        let metadata = r#"{"processes":[{"type":"job","command":"java","args":["-jar","job.jar"],"direct":true}]}"#;
        let mut config = cnb_config(CNB_LAUNCHER, &[], metadata);
        config
            .env
            .insert("CNB_PROCESS_TYPE".to_string(), "job".to_string());
        let out = transform_pod(config);
        assert!(out.contains("JAVA_TOOL_OPTIONS"));
    }

    #[test]
    fn failure_modes_leave_container_unchanged() {
        fn container() -> Container {
            Container {
                name: "t".to_string(),
                ..Default::default()
            }
        }
        fn apply(config: &ImageConfiguration) -> Error {
            let mut c = container();
            update_for_cnb_image(&mut c, "cnb/app", config, |_, _| {
                panic!("transform must not run on failure")
            })
            .unwrap_err()
        }

        // Missing metadata label.
        let mut missing = cnb_config(CNB_LAUNCHER, &[], JAVA_WEB_METADATA);
        missing.labels.remove(BUILD_METADATA_LABEL);
        assert!(matches!(apply(&missing), Error::CnbMetadataMissing { .. }));

        // Unparseable metadata.
        let invalid = cnb_config(CNB_LAUNCHER, &[], "not json");
        assert!(matches!(apply(&invalid), Error::CnbMetadataInvalid { .. }));

        // No processes.
        let empty = cnb_config(CNB_LAUNCHER, &[], r#"{"processes":[]}"#);
        assert!(matches!(apply(&empty), Error::CnbNoProcesses { .. }));

        // Unresolvable process type.
        let unresolved = cnb_config("/cnb/process/worker", &[], JAVA_WEB_METADATA);
        assert!(matches!(
            apply(&unresolved),
            Error::CnbProcessUnresolved { .. }
        ));
    }

    #[test]
    fn engine_leaves_failed_cnb_container_untouched() {
        let invalid = cnb_config(CNB_LAUNCHER, &[], "not json");
        let yaml = concat!(
            "apiVersion: v1\n",
            "kind: Pod\n",
            "metadata:\n",
            "  name: p\n",
            "spec:\n",
            "  containers:\n",
            "  - name: t\n",
            "    image: cnb/app\n",
        );
        let mut list = ManifestList::new();
        list.append(yaml.as_bytes());
        let mut loader = MapLoader(HashMap::from([("cnb/app".to_string(), invalid)]));
        let out = engine().transform(&list, &mut loader);
        assert_eq!(out.to_string(), list.to_string());
    }

    #[test]
    fn inner_transformer_port_allocation_respects_pod_ports() {
        // A declared port at 5005 pushes the JDWP allocation to 5006.
        let mut allocator = PortAllocator::new([5005]);
        let mut container = Container {
            name: "t".to_string(),
            ..Default::default()
        };
        let config = cnb_config(CNB_LAUNCHER, &[], JAVA_WEB_METADATA);
        let result = update_for_cnb_image(&mut container, "cnb/app", &config, |c, ic| {
            crate::debug::jdwp::JdwpTransformer.apply(
                c,
                ic,
                &mut allocator,
                &TransformContext {
                    launchers: &[],
                    protocols: &[],
                },
            )
        })
        .unwrap();
        assert_eq!(result.configuration.ports["jdwp"], 5006);
    }
}
