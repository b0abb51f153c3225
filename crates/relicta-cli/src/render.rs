//! Renders a [`ChangeSet`] into the markdown release notes attached to a
//! run by `relicta notes`.

use relicta_core::aggregator::{ChangeEntry, ChangeSet};
use relicta_types::Version;

pub fn render_notes(version: &Version, change_set: &ChangeSet) -> String {
    let mut out = format!("## {version}\n\n");

    if !change_set.breaking.is_empty() {
        out.push_str("### ⚠ BREAKING CHANGES\n\n");
        render_entries(&mut out, &change_set.breaking);
        out.push('\n');
    }

    render_section(&mut out, "Features", &change_set.features);
    render_section(&mut out, "Fixes", &change_set.fixes);
    render_section(&mut out, "Performance", &change_set.perf);
    render_section(&mut out, "Refactors", &change_set.refactors);
    render_section(&mut out, "Documentation", &change_set.docs);

    out
}

fn render_section(out: &mut String, title: &str, entries: &[ChangeEntry]) {
    if entries.is_empty() {
        return;
    }
    out.push_str(&format!("### {title}\n\n"));
    render_entries(out, entries);
    out.push('\n');
}

fn render_entries(out: &mut String, entries: &[ChangeEntry]) {
    for entry in entries {
        let scope = entry.classification.scope.as_deref().map(|s| format!("**{s}**: ")).unwrap_or_default();
        out.push_str(&format!("- {scope}{} (`{}`)\n", entry.commit.subject, entry.commit.short_hash));
    }
}
