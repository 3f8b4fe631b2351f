//! Subpath helpers.
//!
//! A subpath is a `/`-separated path relative to a tree's logical root. The
//! empty string names the root itself.

/// Resolve `.` and `..` components and collapse repeated separators.
///
/// `..` removes the previous component, or is kept when there is nothing
/// left to remove, so `../a` stays `../a` while `a/../b` becomes `b`.
/// The result never starts or ends with `/`.
pub fn canonicalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match out.last() {
                Some(last) if *last != ".." => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            name => out.push(name),
        }
    }

    out.join("/")
}

/// Split a canonical subpath into its components.
pub fn components(subpath: &str) -> impl Iterator<Item = &str> {
    subpath.split('/').filter(|c| !c.is_empty())
}

/// Join a directory subpath and a child name.
pub fn join_subpath(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Parent of a subpath; the parent of a top-level name is the root (`""`).
pub fn parent_subpath(subpath: &str) -> &str {
    match subpath.rfind('/') {
        Some(idx) => &subpath[..idx],
        None => "",
    }
}

/// Last component of a subpath.
pub fn file_name(subpath: &str) -> &str {
    match subpath.rfind('/') {
        Some(idx) => &subpath[idx + 1..],
        None => subpath,
    }
}
