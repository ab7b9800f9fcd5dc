use std::cmp::Ordering;
use std::io;
use std::path::Path;

use sentinel_commons::{resolve, to_posix_relative};
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::utils::TEMP_FILE_PREFIX;

/// One entry of a sandbox listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub name: String,
    /// Root-relative POSIX path.
    pub path: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

impl FileNode {
    /// Depth-first iterator over this node and its descendants.
    pub fn walk(&self) -> Box<dyn Iterator<Item = &FileNode> + '_> {
        Box::new(std::iter::once(self).chain(self.children.iter().flat_map(FileNode::walk)))
    }
}

/// Directories before files, then byte-wise by name.
fn listing_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    let a_dir = a.file_type().is_dir();
    let b_dir = b.file_type().is_dir();
    b_dir
        .cmp(&a_dir)
        .then_with(|| a.file_name().cmp(b.file_name()))
}

pub(crate) fn build_tree(root: &Path) -> io::Result<Vec<FileNode>> {
    let mut top = Vec::new();
    // Open directories; `stack[i]` sits at depth `i + 1`.
    let mut stack: Vec<FileNode> = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by(listing_order);

    for entry in walker {
        let entry = entry?;
        while stack.len() >= entry.depth() {
            close_directory(&mut stack, &mut top);
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(TEMP_FILE_PREFIX) {
            continue;
        }

        let file_type = entry.file_type();
        let relative = to_posix_relative(root, entry.path());
        if file_type.is_symlink() && resolve(root, &relative).is_err() {
            continue;
        }

        let node = FileNode {
            name,
            path: relative,
            is_dir: file_type.is_dir(),
            children: Vec::new(),
        };
        if node.is_dir {
            stack.push(node);
        } else {
            attach(node, &mut stack, &mut top);
        }
    }

    while !stack.is_empty() {
        close_directory(&mut stack, &mut top);
    }
    Ok(top)
}

fn close_directory(stack: &mut Vec<FileNode>, top: &mut Vec<FileNode>) {
    if let Some(node) = stack.pop() {
        attach(node, stack, top);
    }
}

fn attach(node: FileNode, stack: &mut [FileNode], top: &mut Vec<FileNode>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => top.push(node),
    }
}
