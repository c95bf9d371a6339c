// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Human and JSON renderers for `status`, `check`, and `link --dry-run`
//! (spec §4.14). None of the underlying classifier/integrity types
//! implement `Serialize`, so JSON output is assembled by hand via
//! `serde_json::json!` rather than derived.

use serde_json::{json, Value};

use crate::classifier::Status;
use crate::integrity::IntegrityReport;
use crate::planner::PlannedAction;
use crate::platform::PlatformKey;
use crate::registry::Project;
use crate::store::Store;

pub struct DependencyStatus {
    pub lib_name: String,
    pub commit: String,
    pub label: &'static str,
}

pub struct ProjectStatus {
    pub path: String,
    pub dependencies: Vec<DependencyStatus>,
}

pub fn status_label(status: &Status) -> &'static str {
    match status {
        Status::Linked => "linked",
        Status::Relink => "relink",
        Status::Replace => "replace",
        Status::Absorb => "absorb",
        Status::LinkNew => "link-new",
        Status::Missing { .. } => "missing",
    }
}

pub fn build_project_status(store: &Store, project: &Project) -> ProjectStatus {
    let dependencies = project
        .dependencies
        .iter()
        .map(|dep| {
            let local = project.path.join(crate::environment::MANIFEST_3RDPARTY_SUBDIR).join(&dep.lib_name);
            let requested: Vec<_> = project.platforms.iter().copied().collect();
            let status = crate::classifier::classify(store, &local, dep, &requested);
            DependencyStatus {
                lib_name: dep.lib_name.clone(),
                commit: dep.commit.clone(),
                label: status_label(&status),
            }
        })
        .collect();

    ProjectStatus { path: project.path.to_string_lossy().into_owned(), dependencies }
}

pub fn print_json(statuses: &[ProjectStatus]) {
    let value: Vec<Value> = statuses
        .iter()
        .map(|p| {
            json!({
                "path": p.path,
                "dependencies": p.dependencies.iter().map(|d| json!({
                    "libName": d.lib_name,
                    "commit": d.commit,
                    "status": d.label,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
}

pub fn print_human(statuses: &[ProjectStatus], tree: bool) {
    for project in statuses {
        println!("{}", project.path);
        for (i, dep) in project.dependencies.iter().enumerate() {
            let branch = if tree {
                if i + 1 == project.dependencies.len() { "└── " } else { "├── " }
            } else {
                "  "
            };
            println!("{branch}{}@{} [{}]", dep.lib_name, dep.commit, dep.label);
        }
    }
}

pub fn print_plan(planned: &[PlannedAction]) {
    if planned.is_empty() {
        println!("[info] nothing to do");
        return;
    }
    println!("[info] plan:");
    for action in planned {
        println!("  {}@{} -> {}", action.dependency.lib_name, action.dependency.commit, status_label(&action.status));
    }
}

pub fn print_link_summary(project_path: &std::path::Path, applied: usize, skipped: usize) {
    println!("[ok] linked {applied} dependencies in {}", project_path.display());
    if skipped > 0 {
        println!("[warn] {skipped} dependencies skipped (missing, downloads disabled)");
    }
}

pub fn print_integrity_json(report: &IntegrityReport) {
    let value = json!({
        "clean": report.is_clean(),
        "invalidProjects": report.invalid_projects,
        "danglingLinks": report.dangling_links.iter().map(|d| json!({
            "project": d.project_fingerprint,
            "libName": d.dependency.lib_name,
            "commit": d.dependency.commit,
        })).collect::<Vec<_>>(),
        "orphanLibraries": report.orphan_libraries.iter().map(|o| json!({
            "libName": o.lib_name,
            "commit": o.commit,
            "platform": platform_key_str(o.platform),
            "size": o.size,
        })).collect::<Vec<_>>(),
        "missingLibraries": report.missing_libraries.iter().map(|m| json!({
            "project": m.project_fingerprint,
            "libName": m.dependency.lib_name,
            "commit": m.dependency.commit,
        })).collect::<Vec<_>>(),
        "staleReferences": report.stale_references.iter().map(|s| json!({
            "storeKey": s.store_key,
            "project": s.project_fingerprint,
        })).collect::<Vec<_>>(),
    });

    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
}

pub fn print_integrity_human(report: &IntegrityReport, fixed: bool) {
    if report.is_clean() {
        println!("[ok] store and registry are consistent");
        return;
    }

    let verb = if fixed { "repaired" } else { "found" };

    if !report.invalid_projects.is_empty() {
        println!("[warn] {} invalid project(s) {verb}", report.invalid_projects.len());
    }
    for link in &report.dangling_links {
        println!("[warn] dangling link: {}@{} in project {}", link.dependency.lib_name, link.dependency.commit, link.project_fingerprint);
    }
    for orphan in &report.orphan_libraries {
        println!("[warn] orphan library: {}@{} ({})", orphan.lib_name, orphan.commit, platform_key_str(orphan.platform));
    }
    for missing in &report.missing_libraries {
        println!("[warn] missing library: {}@{} referenced by project {}", missing.dependency.lib_name, missing.dependency.commit, missing.project_fingerprint);
    }
    for stale in &report.stale_references {
        println!("[warn] stale reference: {} from project {}", stale.store_key, stale.project_fingerprint);
    }
}

fn platform_key_str(key: PlatformKey) -> String {
    key.as_str().to_string()
}
