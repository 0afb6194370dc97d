//! Container image references

/// Whether `image` pins a content digest, as in `ceph/ceph@sha256:...`
#[must_use]
pub fn is_repo_digest(image: &str) -> bool {
    image.contains('@')
}
