//! Shared fixture: a repository shaped like github/gitignore
//!
//! ```text
//! root/                     130 templates + README.md, LICENSE, .gitignore
//! ├── .github/              no templates
//! ├── Global/               70 templates + README.md
//! ├── community/
//! │   ├── Python/           10 templates
//! │   ├── JavaScript/       8 templates
//! │   └── embedded/         5 templates
//! └── vendor                submodule (commit entry)
//! ```

#![allow(dead_code)]

use update_gitignore::{MockTreeProvider, TreeEntry};

pub const FIXTURE_TEMPLATES: usize = 223;

pub const ROOT_SHA: &str = "root";
pub const GLOBAL_SHA: &str = "global";
pub const COMMUNITY_SHA: &str = "community";
pub const PYTHON_SHA: &str = "community-python";
pub const JAVASCRIPT_SHA: &str = "community-javascript";
pub const EMBEDDED_SHA: &str = "community-embedded";

fn templates(prefix: &str, count: usize) -> Vec<TreeEntry> {
    (0..count)
        .map(|i| {
            TreeEntry::blob(
                format!("{prefix}{i:03}.gitignore"),
                format!("{}-{i:03}", prefix.to_lowercase()),
                100 + i as u64,
            )
        })
        .collect()
}

/// The fixture repository with `main` pointing at [`ROOT_SHA`]
pub fn fixture() -> MockTreeProvider {
    let mut root = templates("Lang", 130);
    root.extend([
        TreeEntry::blob("README.md", "readme", 2048),
        TreeEntry::blob("LICENSE", "license", 1024),
        TreeEntry::blob(".gitignore", "dotgitignore", 12),
        TreeEntry::tree(".github", "dotgithub"),
        TreeEntry::tree("Global", GLOBAL_SHA),
        TreeEntry::tree("community", COMMUNITY_SHA),
        TreeEntry::other("commit", "vendor", "submodule"),
    ]);

    let mut global = templates("Global", 70);
    global.push(TreeEntry::blob("README.md", "global-readme", 512));

    MockTreeProvider::new()
        .with_head("main", Some(ROOT_SHA))
        .with_tree(ROOT_SHA, root)
        .with_tree(
            "dotgithub",
            vec![
                TreeEntry::blob("CODEOWNERS", "codeowners", 40),
                TreeEntry::blob("PULL_REQUEST_TEMPLATE.md", "prt", 300),
            ],
        )
        .with_tree(GLOBAL_SHA, global)
        .with_tree(
            COMMUNITY_SHA,
            vec![
                TreeEntry::tree("Python", PYTHON_SHA),
                TreeEntry::tree("JavaScript", JAVASCRIPT_SHA),
                TreeEntry::tree("embedded", EMBEDDED_SHA),
            ],
        )
        .with_tree(PYTHON_SHA, templates("Py", 10))
        .with_tree(JAVASCRIPT_SHA, templates("Js", 8))
        .with_tree(EMBEDDED_SHA, templates("Emb", 5))
}
