// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `${VAR}` interpolation, kept as its own pass so it fails loudly on an
//! unresolved reference instead of silently leaving `${...}` in place
//! (spec §9).

use std::collections::HashMap;

use super::{Error, Manifest, Sparse};

/// Replace every `${NAME}` occurrence in `input` with its value from
/// `vars`. Returns an error naming the first unresolved reference.
pub fn interpolate(input: &str, vars: &HashMap<String, String>) -> Result<String, Error> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(Error::UnresolvedVar(after.to_string()));
        };
        let name = &after[..end];
        let value = vars.get(name).ok_or_else(|| Error::UnresolvedVar(name.to_string()))?;
        output.push_str(value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

/// Verify every `sparse` field that is a `${VAR}` reference resolves
/// against `manifest.vars`, failing loudly otherwise (spec §9).
pub fn check_resolvable(manifest: &Manifest) -> Result<(), Error> {
    for repo in &manifest.repos.common {
        if let Some(Sparse::VarRef(reference)) = &repo.sparse {
            resolve_var_ref(reference, &manifest.vars)?;
        }
    }
    Ok(())
}

/// Resolve a `sparse` field, literal or `${VAR}`-indirected, against `vars`.
pub fn resolve_sparse(sparse: &Sparse, vars: &HashMap<String, String>) -> Result<HashMap<String, Vec<String>>, Error> {
    match sparse {
        Sparse::Literal(map) => Ok(map.clone()),
        Sparse::VarRef(reference) => {
            let raw = resolve_var_ref(reference, vars)?;
            serde_json::from_str(&raw).map_err(|e| Error::Invalid {
                path: std::path::PathBuf::new(),
                reason: format!("sparse variable {reference:?} did not resolve to a valid sparse mapping: {e}"),
            })
        }
    }
}

fn resolve_var_ref(reference: &str, vars: &HashMap<String, String>) -> Result<String, Error> {
    let name = reference
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(reference);
    vars.get(name).cloned().ok_or_else(|| Error::UnresolvedVar(name.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interpolate_replaces_known_vars() {
        let mut vars = HashMap::new();
        vars.insert("NAME".to_string(), "world".to_string());
        assert_eq!(interpolate("hello ${NAME}!", &vars).unwrap(), "hello world!");
    }

    #[test]
    fn interpolate_fails_on_unresolved_var() {
        let vars = HashMap::new();
        assert!(interpolate("${MISSING}", &vars).is_err());
    }
}
