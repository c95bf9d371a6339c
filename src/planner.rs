// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Turns classifier output into an ordered action list: repair mismatches
//! first, then new links, then downloads (spec §4.9).

use std::path::PathBuf;

use crate::classifier::Status;
use crate::platform::Platform;
use crate::registry::DependencyRef;

/// One planned action against a single dependency (spec §4.9).
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub dependency: DependencyRef,
    pub local: PathBuf,
    pub status: Status,
}

/// Order actions so repairs run before fresh links, and fresh links before
/// anything that needs a download (spec §4.9: "execution order: repair
/// classifier mismatches first (RELINK, REPLACE, ABSORB), then LINK_NEW,
/// then MISSING").
pub fn plan(mut actions: Vec<PlannedAction>) -> Vec<PlannedAction> {
    actions.sort_by_key(|action| action_rank(&action.status));
    actions
}

fn action_rank(status: &Status) -> u8 {
    match status {
        Status::Relink => 0,
        Status::Replace => 0,
        Status::Absorb => 0,
        Status::Linked => 1,
        Status::LinkNew => 2,
        Status::Missing { .. } => 3,
    }
}

/// Dependencies whose plan requires a download, with the still-missing
/// platform subset per dependency (spec §4.9/§4.10).
pub fn downloads_needed(actions: &[PlannedAction]) -> Vec<(&DependencyRef, &[Platform])> {
    actions
        .iter()
        .filter_map(|action| match &action.status {
            Status::Missing { missing } => Some((&action.dependency, missing.as_slice())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn action(lib: &str, status: Status) -> PlannedAction {
        PlannedAction {
            dependency: DependencyRef::new(lib, "c1", Platform::MacOS),
            local: PathBuf::from(format!("/p/3rdparty/{lib}")),
            status,
        }
    }

    #[test]
    fn plan_orders_repairs_before_new_links_before_downloads() {
        let actions = vec![
            action("libMissing", Status::Missing { missing: vec![Platform::MacOS] }),
            action("libNew", Status::LinkNew),
            action("libRelink", Status::Relink),
        ];

        let planned = plan(actions);
        let order: Vec<&str> = planned.iter().map(|a| a.dependency.lib_name.as_str()).collect();
        assert_eq!(order, vec!["libRelink", "libNew", "libMissing"]);
    }

    #[test]
    fn downloads_needed_extracts_missing_platforms() {
        let actions = vec![
            action("libA", Status::Linked),
            action("libB", Status::Missing { missing: vec![Platform::Android] }),
        ];

        let needed = downloads_needed(&actions);
        assert_eq!(needed.len(), 1);
        assert_eq!(needed[0].0.lib_name, "libB");
        assert_eq!(needed[0].1, &[Platform::Android]);
    }
}
