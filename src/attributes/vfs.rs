//! In-process attribute tree, laid out like sysfs.
//!
//! Directories only exist while a group is published beneath them. Every
//! leaf is an [`Attribute`] whose reads and writes go to its
//! [`AttributeOps`] callbacks.

use crate::error::AttrError;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const SYSFS_ROOT: &str = "/sys";
/// Largest single write an attribute accepts.
pub const PAGE_SIZE: usize = 4096;

const S_IRUSR: u16 = 0o400;
const S_IWUSR: u16 = 0o200;

/// Accessor callbacks behind one attribute file.
pub trait AttributeOps: Send + Sync {
    fn show(&self) -> String;

    /// Returns how many bytes of `buf` were consumed.
    fn store(&self, buf: &[u8]) -> Result<usize, AttrError>;
}

#[derive(Clone)]
pub struct Attribute {
    name: String,
    perms: u16,
    ops: Arc<dyn AttributeOps>,
}

impl Attribute {
    pub fn new(name: &str, perms: u16, ops: Arc<dyn AttributeOps>) -> Self {
        Attribute {
            name: name.to_string(),
            perms,
            ops,
        }
    }

    fn readable(&self) -> bool {
        self.perms & S_IRUSR != 0
    }

    fn writable(&self) -> bool {
        self.perms & S_IWUSR != 0
    }
}

pub struct AttributeGroup {
    pub name: String,
    pub attrs: Vec<Attribute>,
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[derive(Default)]
pub struct VirtualFs {
    groups: RwLock<BTreeMap<String, Arc<Vec<Attribute>>>>,
}

impl VirtualFs {
    pub fn new() -> Arc<Self> {
        Arc::new(VirtualFs::default())
    }

    fn read_groups(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<Vec<Attribute>>>> {
        self.groups.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_groups(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<Vec<Attribute>>>> {
        self.groups.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Publishes `group` as the directory `parent/<group.name>`.
    pub fn publish_group(
        self: &Arc<Self>,
        parent: &str,
        group: AttributeGroup,
    ) -> Result<GroupHandle, AttrError> {
        let parent = normalize(parent);
        if parent != SYSFS_ROOT && !parent.starts_with(&format!("{}/", SYSFS_ROOT)) {
            return Err(AttrError::InvalidInput(format!(
                "{} is outside {}",
                parent, SYSFS_ROOT
            )));
        }
        if group.name.is_empty() || group.name.contains('/') {
            return Err(AttrError::InvalidInput(format!(
                "bad group name '{}'",
                group.name
            )));
        }

        let dir = format!("{}/{}", parent, group.name);
        let mut groups = self.write_groups();
        if groups.contains_key(&dir) {
            return Err(AttrError::AlreadyExists(dir));
        }
        let mut seen = BTreeSet::new();
        for attr in &group.attrs {
            if !seen.insert(attr.name.as_str()) {
                return Err(AttrError::AlreadyExists(format!("{}/{}", dir, attr.name)));
            }
        }
        groups.insert(dir.clone(), Arc::new(group.attrs));
        debug!("Published {}", dir);

        Ok(GroupHandle {
            fs: Arc::clone(self),
            dir,
            removed: false,
        })
    }

    fn remove_group(&self, dir: &str) -> bool {
        self.write_groups().remove(dir).is_some()
    }

    fn lookup(&self, path: &str) -> Result<Attribute, AttrError> {
        let path = normalize(path);
        let (dir, name) = path
            .rsplit_once('/')
            .ok_or_else(|| AttrError::NotFound(path.to_string()))?;
        let groups = self.read_groups();
        if groups.contains_key(path) {
            return Err(AttrError::InvalidInput(format!("{} is a directory", path)));
        }
        groups
            .get(dir)
            .and_then(|attrs| attrs.iter().find(|a| a.name == name).cloned())
            .ok_or_else(|| AttrError::NotFound(path.to_string()))
    }

    pub fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        self.lookup(path).is_ok() || self.list(path).is_ok()
    }

    pub fn read(&self, path: &str) -> Result<String, AttrError> {
        let attr = self.lookup(path)?;
        if !attr.readable() {
            return Err(AttrError::PermissionDenied(normalize(path).to_string()));
        }
        Ok(attr.ops.show())
    }

    pub fn write(&self, path: &str, buf: &[u8]) -> Result<usize, AttrError> {
        let attr = self.lookup(path)?;
        if !attr.writable() {
            return Err(AttrError::PermissionDenied(normalize(path).to_string()));
        }
        if buf.len() > PAGE_SIZE {
            return Err(AttrError::InvalidInput(format!(
                "write of {} bytes exceeds {}",
                buf.len(),
                PAGE_SIZE
            )));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        attr.ops.store(buf)
    }

    /// Entries directly below `dir`. A group lists its attributes in the
    /// order they were published; any other directory lists its children
    /// sorted by name.
    pub fn list(&self, dir: &str) -> Result<Vec<String>, AttrError> {
        let dir = normalize(dir);
        let groups = self.read_groups();
        if let Some(attrs) = groups.get(dir) {
            return Ok(attrs.iter().map(|a| a.name.clone()).collect());
        }

        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        let children: BTreeSet<String> = groups
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        if children.is_empty() && dir != SYSFS_ROOT {
            return Err(AttrError::NotFound(dir.to_string()));
        }
        Ok(children.into_iter().collect())
    }
}

/// Keeps a published group alive. Removing or dropping it takes the whole
/// directory down at once.
pub struct GroupHandle {
    fs: Arc<VirtualFs>,
    dir: String,
    removed: bool,
}

impl GroupHandle {
    pub fn path(&self) -> &str {
        &self.dir
    }

    pub fn remove(mut self) {
        self.remove_inner();
    }

    fn remove_inner(&mut self) {
        if !self.removed {
            self.removed = true;
            if self.fs.remove_group(&self.dir) {
                debug!("Removed {}", self.dir);
            }
        }
    }
}

impl Drop for GroupHandle {
    fn drop(&mut self) {
        self.remove_inner();
    }
}
