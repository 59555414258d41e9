//! Permission set comparison between two roles

use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleComparison {
    pub common: Vec<String>,
    pub only_left: Vec<String>,
    pub only_right: Vec<String>,
}

/// Split two permission lists into shared and exclusive parts, each sorted
pub fn compare_roles(left: &[String], right: &[String]) -> RoleComparison {
    let left: BTreeSet<&String> = left.iter().collect();
    let right: BTreeSet<&String> = right.iter().collect();

    RoleComparison {
        common: left.intersection(&right).map(|p| p.to_string()).collect(),
        only_left: left.difference(&right).map(|p| p.to_string()).collect(),
        only_right: right.difference(&left).map(|p| p.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_compare_roles() {
        let viewer = perms(&["storage.objects.list", "storage.objects.get"]);
        let admin = perms(&["storage.objects.get", "storage.objects.delete", "storage.objects.list"]);

        let cmp = compare_roles(&viewer, &admin);
        assert_eq!(cmp.common, perms(&["storage.objects.get", "storage.objects.list"]));
        assert!(cmp.only_left.is_empty());
        assert_eq!(cmp.only_right, perms(&["storage.objects.delete"]));
    }

    #[test]
    fn test_compare_deduplicates() {
        let cmp = compare_roles(&perms(&["a", "a", "b"]), &perms(&["c"]));
        assert_eq!(cmp.only_left, perms(&["a", "b"]));
        assert_eq!(cmp.only_right, perms(&["c"]));
        assert!(cmp.common.is_empty());
    }
}
