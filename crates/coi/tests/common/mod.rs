//! Shared test support: an in-memory container runtime.
//!
//! Models just enough of the real runtime for the engine's behavior to be
//! observable: name-collision arbitration on launch, a per-container
//! writable layer with permission bits, copy-on-write snapshots of that
//! layer (and only that layer - mounts are host state), and a recorded
//! exec/multiplexer surface.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use coi::error::{Error, Result};
use coi::runtime::{ContainerRuntime, ExecOutput, Instance, InstanceSnapshot};
use coi::session::EVENTS_PATH;

/// One file in a container's writable layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub content: String,
    pub mode: u32,
}

#[derive(Debug, Clone)]
struct StoredSnapshot {
    info: InstanceSnapshot,
    disk: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Clone, Default)]
struct MockInstance {
    running: bool,
    created_at: Option<DateTime<Utc>>,
    disk: BTreeMap<String, FileEntry>,
    snapshots: Vec<StoredSnapshot>,
    mounts: Vec<(String, PathBuf, String)>,
    exec_log: Vec<String>,
    tmux_session: bool,
}

#[derive(Debug, Default)]
struct State {
    instances: BTreeMap<String, MockInstance>,
    /// Monotonic tick used for snapshot creation timestamps.
    ticks: i64,
}

/// In-memory [`ContainerRuntime`].
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<State>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    /// Write a file into a container's writable layer.
    pub fn write_file(&self, container: &str, path: &str, content: &str, mode: u32) {
        let mut state = self.state.lock().unwrap();
        let instance = state.instances.get_mut(container).expect("no such container");
        instance.disk.insert(
            path.to_string(),
            FileEntry {
                content: content.to_string(),
                mode,
            },
        );
    }

    /// Read a file from a container's writable layer.
    pub fn read_file(&self, container: &str, path: &str) -> Option<FileEntry> {
        let state = self.state.lock().unwrap();
        state.instances.get(container)?.disk.get(path).cloned()
    }

    /// Change a file's permission bits.
    pub fn chmod(&self, container: &str, path: &str, mode: u32) {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .instances
            .get_mut(container)
            .expect("no such container")
            .disk
            .get_mut(path)
            .expect("no such file");
        entry.mode = mode;
    }

    /// Remove a file from a container's writable layer.
    pub fn remove_file(&self, container: &str, path: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .instances
            .get_mut(container)
            .expect("no such container")
            .disk
            .remove(path);
    }

    /// Everything exec'd interactively in a container, in order.
    pub fn exec_log(&self, container: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .instances
            .get(container)
            .map(|i| i.exec_log.clone())
            .unwrap_or_default()
    }

    /// Recorded workspace mounts for a container.
    pub fn mounts(&self, container: &str) -> Vec<(String, PathBuf, String)> {
        let state = self.state.lock().unwrap();
        state
            .instances
            .get(container)
            .map(|i| i.mounts.clone())
            .unwrap_or_default()
    }

    /// Append to the container's status-events file, as the supervised
    /// launcher would.
    pub fn append_event(&self, container: &str, line: &str) {
        let mut state = self.state.lock().unwrap();
        let instance = state.instances.get_mut(container).expect("no such container");
        let entry = instance
            .disk
            .entry(EVENTS_PATH.to_string())
            .or_insert_with(|| FileEntry {
                content: String::new(),
                mode: 0o644,
            });
        entry.content.push_str(line);
        entry.content.push('\n');
    }

    fn snapshot_infos(instance: &MockInstance) -> Vec<InstanceSnapshot> {
        instance.snapshots.iter().map(|s| s.info.clone()).collect()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn launch(&self, _image: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.instances.contains_key(name) {
            return Err(Error::AlreadyExists(format!(
                "Instance \"{name}\" already exists"
            )));
        }
        state.ticks += 1;
        let created_at = Self::base_time() + Duration::seconds(state.ticks);
        state.instances.insert(
            name.to_string(),
            MockInstance {
                running: true,
                created_at: Some(created_at),
                ..MockInstance::default()
            },
        );
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        instance.running = true;
        Ok(())
    }

    async fn stop(&self, name: &str, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        instance.running = false;
        instance.tmux_session = false;
        Ok(())
    }

    async fn delete(&self, name: &str, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .instances
            .remove(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Instance>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .instances
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, instance)| Instance {
                name: name.clone(),
                status: if instance.running {
                    "Running".to_string()
                } else {
                    "Stopped".to_string()
                },
                created_at: instance.created_at,
            })
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Option<Instance>> {
        Ok(self.list("").await?.into_iter().find(|i| i.name == name))
    }

    async fn exec_capture(
        &self,
        name: &str,
        _user: Option<&str>,
        script: &str,
    ) -> Result<ExecOutput> {
        let state = self.state.lock().unwrap();
        let Some(instance) = state.instances.get(name) else {
            return Err(Error::not_found(format!("Instance \"{name}\" not found")));
        };
        if !instance.running {
            return Ok(ExecOutput {
                stdout: String::new(),
                stderr: "instance is not running".to_string(),
                exit_code: 1,
            });
        }

        // The probes the engine actually sends.
        if script.contains(EVENTS_PATH) {
            let log = instance
                .disk
                .get(EVENTS_PATH)
                .map(|f| f.content.clone())
                .unwrap_or_default();
            return Ok(ExecOutput {
                stdout: log,
                stderr: String::new(),
                exit_code: 0,
            });
        }
        if script.contains("tmux has-session") {
            return Ok(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: if instance.tmux_session { 0 } else { 1 },
            });
        }

        Ok(ExecOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn exec_interactive(&self, name: &str, _user: Option<&str>, script: &str) -> Result<i32> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        if !instance.running {
            return Err(Error::Runtime {
                command: "exec".to_string(),
                message: "instance is not running".to_string(),
            });
        }
        instance.exec_log.push(script.to_string());
        if script.contains("tmux new-session") {
            instance.tmux_session = true;
        }
        Ok(0)
    }

    async fn mount(
        &self,
        name: &str,
        device: &str,
        source: &Path,
        target: &str,
        _readonly: bool,
        _shift: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        instance
            .mounts
            .push((device.to_string(), source.to_path_buf(), target.to_string()));
        Ok(())
    }

    async fn file_pull(&self, name: &str, source: &str, dest: &Path) -> Result<()> {
        let state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;

        // Recreate files under `source` as host files below `dest`, keeping
        // the pulled directory's own name like the real CLI does.
        let base = Path::new(source)
            .file_name()
            .map(|n| dest.join(n))
            .unwrap_or_else(|| dest.to_path_buf());
        let prefix = format!("{}/", source.trim_end_matches('/'));

        for (path, entry) in &instance.disk {
            if let Some(rel) = path.strip_prefix(&prefix) {
                let target = base.join(rel);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&target, &entry.content)?;
            }
        }
        std::fs::create_dir_all(&base)?;
        Ok(())
    }

    async fn file_push(&self, name: &str, source: &Path, dest: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;

        let base_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let dest = format!("{}/{base_name}", dest.trim_end_matches('/'));

        fn walk(
            disk: &mut BTreeMap<String, FileEntry>,
            dir: &Path,
            prefix: &str,
        ) -> std::io::Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                let target = format!("{prefix}/{}", entry.file_name().to_string_lossy());
                if path.is_dir() {
                    walk(disk, &path, &target)?;
                } else {
                    disk.insert(
                        target,
                        FileEntry {
                            content: std::fs::read_to_string(&path).unwrap_or_default(),
                            mode: 0o644,
                        },
                    );
                }
            }
            Ok(())
        }

        if source.is_dir() {
            walk(&mut instance.disk, source, &dest)?;
        } else {
            instance.disk.insert(
                dest,
                FileEntry {
                    content: std::fs::read_to_string(source).unwrap_or_default(),
                    mode: 0o644,
                },
            );
        }
        Ok(())
    }

    async fn snapshot_create(&self, name: &str, snapshot: &str, stateful: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ticks += 1;
        let created_at = Self::base_time() + Duration::seconds(state.ticks);

        let instance = state
            .instances
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        if instance.snapshots.iter().any(|s| s.info.name == snapshot) {
            return Err(Error::AlreadyExists(format!(
                "Snapshot \"{snapshot}\" already exists"
            )));
        }

        let disk = instance.disk.clone();
        instance.snapshots.push(StoredSnapshot {
            info: InstanceSnapshot {
                name: snapshot.to_string(),
                created_at,
                stateful,
            },
            disk,
        });
        Ok(())
    }

    async fn snapshot_list(&self, name: &str) -> Result<Vec<InstanceSnapshot>> {
        let state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        Ok(Self::snapshot_infos(instance))
    }

    async fn snapshot_restore(&self, name: &str, snapshot: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        let disk = instance
            .snapshots
            .iter()
            .find(|s| s.info.name == snapshot)
            .map(|s| s.disk.clone())
            .ok_or_else(|| Error::not_found(format!("Snapshot \"{snapshot}\" not found")))?;
        instance.disk = disk;
        Ok(())
    }

    async fn snapshot_delete(&self, name: &str, snapshot: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Instance \"{name}\" not found")))?;
        let before = instance.snapshots.len();
        instance.snapshots.retain(|s| s.info.name != snapshot);
        if instance.snapshots.len() == before {
            return Err(Error::not_found(format!(
                "Snapshot \"{snapshot}\" not found"
            )));
        }
        Ok(())
    }
}
