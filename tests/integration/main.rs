//! Integration tests for Omni

mod cli_tests {
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn omni() -> Command {
        let mut cmd = Command::cargo_bin("omni").unwrap();
        cmd.arg("--no-color");
        cmd
    }

    #[test]
    fn help_displays() {
        omni()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("High performance task runner"));
    }

    #[test]
    fn version_displays() {
        omni().arg("--version").assert().success();
        omni().arg("-v").assert().success();
    }

    #[test]
    fn missing_tasks_is_fatal() {
        omni()
            .assert()
            .failure()
            .stderr(predicate::str::contains("missing required argument"));
    }

    #[test]
    fn colon_in_task_name_is_fatal() {
        omni()
            .args(["run", "has:colon"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot contain colons"));
    }

    #[test]
    fn missing_workspace_config_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        omni()
            .current_dir(tmp.path())
            .args(["run", "test"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("error:"));
    }

    #[test]
    fn run_executes_from_yaml_configs() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("omni-workspace.yaml"),
            "name: demo\ntargets: [foo]\n",
        )
        .unwrap();
        std::fs::create_dir_all(tmp.path().join("foo")).unwrap();
        std::fs::write(
            tmp.path().join("foo/omni-target.yaml"),
            concat!(
                "pipeline:\n",
                "  test:\n",
                "    command: echo hello\n",
                "    includes: [\"*.txt\"]\n",
            ),
        )
        .unwrap();
        std::fs::write(tmp.path().join("foo/a.txt"), "input").unwrap();

        omni()
            .current_dir(tmp.path())
            .args(["run", "test"])
            .assert()
            .success()
            .stdout(predicate::str::contains("foo:test:"))
            .stdout(predicate::str::contains("hello"))
            .stdout(predicate::str::contains("1 total"));

        // a failed task summarizes without failing the process
        std::fs::write(
            tmp.path().join("foo/omni-target.yaml"),
            concat!(
                "pipeline:\n",
                "  test:\n",
                "    command: exit 1\n",
                "    includes: [\"*.txt\"]\n",
            ),
        )
        .unwrap();
        std::fs::write(tmp.path().join("foo/a.txt"), "changed input").unwrap();
        omni()
            .current_dir(tmp.path())
            .args(["run", "test"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 failed"));
    }

    #[test]
    fn tree_prints_dependency_json() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("omni-workspace.yaml"),
            "name: demo\ntargets: [foo, bar]\n",
        )
        .unwrap();
        for (dir, yaml) in [
            (
                "foo",
                "dependencies: [bar]\npipeline:\n  test:\n    command: a\n    dependsOn: [\"^test\"]\n",
            ),
            ("bar", "pipeline:\n  test:\n    command: b\n"),
        ] {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
            std::fs::write(tmp.path().join(dir).join("omni-target.yaml"), yaml).unwrap();
        }

        omni()
            .current_dir(tmp.path())
            .args(["tree", "test"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""foo:test""#))
            .stdout(predicate::str::contains(r#""bar:test""#));
    }

    #[test]
    fn unlock_releases_a_stale_lock() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("omni-workspace.yaml"), "name: demo\n").unwrap();
        let lock = tmp.path().join(".omni/cache/lock");
        std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
        std::fs::write(&lock, "").unwrap();

        omni()
            .current_dir(tmp.path())
            .arg("unlock")
            .assert()
            .success()
            .stdout(predicate::str::contains("Lock removed successfully."));
        assert!(!lock.exists());

        // releasing again is an error
        omni()
            .current_dir(tmp.path())
            .arg("unlock")
            .assert()
            .failure()
            .stderr(predicate::str::contains("not held"));
    }
}

mod scenarios {
    use omni::cache::{archive, CacheDirs, CacheReader, CacheWriter};
    use omni::config::{PipelineConfig, TargetConfig};
    use omni::exec::{Executor, RunSummary};
    use omni::graph::DependencyGraph;
    use omni::transport::{LocalTransport, Transport};
    use omni::ui::OutputSink;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        logs: Mutex<Vec<(String, String)>>,
    }

    impl OutputSink for RecordingSink {
        fn task_output(&self, id: &str, logs: &str) {
            self.logs
                .lock()
                .unwrap()
                .push((id.to_string(), logs.to_string()));
        }
    }

    struct Report {
        summary: RunSummary,
        logs: Vec<(String, String)>,
    }

    impl Report {
        fn logs_for(&self, id: &str) -> &str {
            &self
                .logs
                .iter()
                .find(|(log_id, _)| log_id == id)
                .unwrap_or_else(|| panic!("no logs for {id}"))
                .1
        }
    }

    /// A scratch workspace driving full runs through the library, the
    /// way the run command wires them up
    struct Workspace {
        tmp: TempDir,
        configs: HashMap<String, TargetConfig>,
        runs: usize,
    }

    impl Workspace {
        fn new(configs: HashMap<String, TargetConfig>) -> Self {
            let tmp = TempDir::new().unwrap();
            fs::create_dir_all(tmp.path().join("work")).unwrap();
            for dir in configs.keys() {
                fs::create_dir_all(tmp.path().join("work").join(dir)).unwrap();
            }
            Self {
                tmp,
                configs,
                runs: 0,
            }
        }

        fn root(&self) -> PathBuf {
            self.tmp.path().join("work")
        }

        fn write(&self, rel: &str, contents: &str) {
            let path = self.root().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn bundle(&self, dir: &str) -> Option<Vec<u8>> {
            fs::read(self.tmp.path().join("cache").join(format!("{dir}-meta.tar.zst"))).ok()
        }

        /// Hashes stored in a published bundle's inputs.json
        fn bundle_inputs(&self, dir: &str) -> Vec<String> {
            let bytes = self.bundle(dir).expect("bundle not published");
            let dst = self.tmp.path().join(format!("unpack-{dir}-{}", self.runs));
            archive::unpack(&bytes, &dst).unwrap();
            let inputs = fs::read(dst.join("inputs.json")).unwrap();
            let parsed: HashMap<String, serde_json::Value> =
                serde_json::from_slice(&inputs).unwrap();
            parsed.into_keys().collect()
        }

        async fn run(&mut self, tasks: &[&str]) -> Report {
            self.runs += 1;
            let dirs = CacheDirs::at(&self.tmp.path().join(format!("run-{}", self.runs))).unwrap();
            let transport: Arc<dyn Transport> =
                Arc::new(LocalTransport::new(self.tmp.path().join("cache")));
            let targets: Vec<String> = self.configs.keys().cloned().collect();

            let reader = Arc::new(CacheReader::new(
                transport.clone(),
                self.configs.clone(),
                targets,
                self.root(),
                &dirs,
                false,
            ));
            let writer = Arc::new(CacheWriter::new(transport, reader.clone(), &dirs));
            let sink = Arc::new(RecordingSink::default());
            let executor = Arc::new(Executor::new(reader, writer, sink.clone()));

            let tasks: Vec<String> = tasks.iter().map(|t| t.to_string()).collect();
            let mut graph = DependencyGraph::new(self.configs.clone());
            graph.populate(&tasks, None).unwrap();
            graph.execute(executor.clone()).await;

            let logs = sink.logs.lock().unwrap().clone();
            Report {
                summary: executor.summary(),
                logs,
            }
        }
    }

    fn task(command: &str) -> PipelineConfig {
        PipelineConfig {
            command: command.to_string(),
            includes: vec!["*.txt".to_string()],
            ..Default::default()
        }
    }

    fn single_target(pipeline: PipelineConfig) -> HashMap<String, TargetConfig> {
        HashMap::from([(
            "foo".to_string(),
            TargetConfig {
                pipeline: HashMap::from([("test".to_string(), pipeline)]),
                ..Default::default()
            },
        )])
    }

    // S1: first run of a single target executes the task and publishes
    // a bundle whose inputs.json holds exactly one hash
    #[tokio::test]
    async fn first_run_executes_and_publishes() {
        let mut ws = Workspace::new(single_target(task("echo hello")));
        ws.write("foo/a.txt", "input");

        let report = ws.run(&["test"]).await;

        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.hits, 0);
        assert!(report.summary.failed.is_empty());
        assert!(report.summary.errors.is_empty());
        assert_eq!(
            report.logs_for("foo:test"),
            "cache miss, executing task...\nhello"
        );
        assert_eq!(ws.bundle_inputs("foo").len(), 1);
    }

    // S2: an unchanged second run replays from cache without spawning
    // the command
    #[tokio::test]
    async fn second_run_is_a_cache_hit() {
        let marker = "ran.marker";
        let mut ws = Workspace::new(single_target(task(&format!(
            "echo hello && touch {marker}"
        ))));
        ws.write("foo/a.txt", "input");

        ws.run(&["test"]).await;
        fs::remove_file(ws.root().join("foo").join(marker)).unwrap();

        let report = ws.run(&["test"]).await;
        assert_eq!(report.summary.hits, 1);
        assert_eq!(report.summary.total, 1);
        assert_eq!(
            report.logs_for("foo:test"),
            "cache hit, replaying logs...\nhello"
        );
        // the command did not run again
        assert!(!ws.root().join("foo").join(marker).exists());
    }

    // S3: a change to an excluded file does not invalidate the target
    #[tokio::test]
    async fn excluded_changes_keep_the_cache_valid() {
        let mut pipeline = task("echo hello");
        pipeline.excludes = vec!["exclude.txt".to_string()];
        let mut ws = Workspace::new(single_target(pipeline));
        ws.write("foo/a.txt", "input");
        ws.write("foo/exclude.txt", "one");

        ws.run(&["test"]).await;
        ws.write("foo/exclude.txt", "two");

        let report = ws.run(&["test"]).await;
        assert_eq!(report.summary.hits, 1);
    }

    fn dependent_targets(bar_command: &str) -> HashMap<String, TargetConfig> {
        HashMap::from([
            (
                "foo".to_string(),
                TargetConfig {
                    dependencies: vec!["bar".to_string()],
                    pipeline: HashMap::from([(
                        "test".to_string(),
                        PipelineConfig {
                            command: "echo foo".to_string(),
                            depends_on: vec!["^test".to_string()],
                            includes: vec!["*.txt".to_string()],
                            ..Default::default()
                        },
                    )]),
                    ..Default::default()
                },
            ),
            (
                "bar".to_string(),
                TargetConfig {
                    pipeline: HashMap::from([("test".to_string(), task(bar_command))]),
                    ..Default::default()
                },
            ),
        ])
    }

    // S4: invalidating a dependency re-runs every dependent and
    // republishes both bundles
    #[tokio::test]
    async fn dependency_invalidation_cascades() {
        let mut ws = Workspace::new(dependent_targets("echo bar"));
        ws.write("foo/a.txt", "foo input");
        ws.write("bar/a.txt", "bar input");

        let first = ws.run(&["test"]).await;
        assert_eq!(first.summary.total, 2);
        assert_eq!(first.summary.hits, 0);

        ws.write("bar/a.txt", "bar input changed");

        let second = ws.run(&["test"]).await;
        assert_eq!(second.summary.total, 2);
        assert_eq!(second.summary.hits, 0);
        assert!(second.logs_for("bar:test").starts_with("cache miss"));
        assert!(second.logs_for("foo:test").starts_with("cache miss"));
        assert!(ws.bundle("foo").is_some());
        assert!(ws.bundle("bar").is_some());
    }

    // S5: a three-target cycle is rejected before any execution
    #[tokio::test]
    async fn cycles_are_rejected_at_build_time() {
        let cycle = |dep: &str| TargetConfig {
            dependencies: vec![dep.to_string()],
            pipeline: HashMap::from([(
                "test".to_string(),
                PipelineConfig {
                    depends_on: vec!["^test".to_string()],
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        let configs = HashMap::from([
            ("a".to_string(), cycle("b")),
            ("b".to_string(), cycle("c")),
            ("c".to_string(), cycle("a")),
        ]);

        let mut graph = DependencyGraph::new(configs);
        let err = graph.populate(&["test".to_string()], None).unwrap_err();
        assert!(matches!(err, omni::OmniError::CircularDependency(_)));
    }

    // S6: a failed dependency silently skips its dependents; the run
    // reports one failed task and exits normally
    #[tokio::test]
    async fn failed_dependency_skips_dependents() {
        let mut ws = Workspace::new(dependent_targets("exit 1"));
        ws.write("foo/a.txt", "foo input");
        ws.write("bar/a.txt", "bar input");

        let report = ws.run(&["test"]).await;

        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.failed, vec!["bar:test"]);
        assert!(report.logs.iter().all(|(id, _)| id != "foo:test"));
    }

    // a cached failure replays without re-running and still poisons
    // dependents
    #[tokio::test]
    async fn failed_results_replay_from_cache() {
        let mut ws = Workspace::new(dependent_targets("echo boom && exit 1"));
        ws.write("foo/a.txt", "foo input");
        ws.write("bar/a.txt", "bar input");

        let first = ws.run(&["test"]).await;
        assert_eq!(first.summary.failed, vec!["bar:test"]);

        let second = ws.run(&["test"]).await;
        assert_eq!(second.summary.hits, 1);
        assert_eq!(second.summary.total, 1);
        assert_eq!(second.summary.failed, vec!["bar:test"]);
        assert_eq!(
            second.logs_for("bar:test"),
            "cache hit, replaying logs...\nboom"
        );
    }

    // deleting a produced output restores it from the cache bundle on
    // the next updating run
    #[tokio::test]
    async fn deleted_outputs_are_restored() {
        let mut configs = dependent_targets("echo bar");
        let foo = configs.get_mut("foo").unwrap();
        let pipeline = foo.pipeline.get_mut("test").unwrap();
        pipeline.command = "printf data > output.txt".to_string();
        pipeline.outputs = vec!["output.txt".to_string()];

        let mut ws = Workspace::new(configs);
        ws.write("foo/a.txt", "foo input");
        ws.write("bar/a.txt", "bar input");

        ws.run(&["test"]).await;
        assert_eq!(
            fs::read_to_string(ws.root().join("foo/output.txt")).unwrap(),
            "data"
        );

        // delete the output; dirty another target so finalize runs
        fs::remove_file(ws.root().join("foo/output.txt")).unwrap();
        ws.write("bar/a.txt", "bar input changed");

        let report = ws.run(&["test"]).await;
        assert!(report.summary.errors.is_empty());
        assert_eq!(
            fs::read_to_string(ws.root().join("foo/output.txt")).unwrap(),
            "data"
        );
    }

    // property 8: an unchanged rerun leaves the stored hash set
    // byte-identical
    #[tokio::test]
    async fn unchanged_rerun_keeps_the_same_input_hashes() {
        let mut ws = Workspace::new(single_target(task("echo hello")));
        ws.write("foo/a.txt", "input");

        ws.run(&["test"]).await;
        let mut first = ws.bundle_inputs("foo");
        first.sort();

        // force a republish by invalidating and restoring the input
        ws.write("foo/a.txt", "changed");
        ws.run(&["test"]).await;
        ws.write("foo/a.txt", "input");
        ws.run(&["test"]).await;

        let mut third = ws.bundle_inputs("foo");
        third.sort();
        assert_eq!(first, third);
    }
}
