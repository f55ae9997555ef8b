// Licensed under the Apache-2.0 license

use rand::Rng;

/// `<configName>_<random 1-9999>`, per spec.md 4.7. The object path is
/// `/software/<swid>`.
pub fn get_random_software_id(config_name: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1..=9999);
    format!("{config_name}_{suffix}")
}

pub fn software_object_path(swid: &str) -> String {
    format!("/software/{swid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swid_has_the_expected_shape() {
        let id = get_random_software_id("bmc");
        let (name, suffix) = id.split_once('_').unwrap();
        assert_eq!(name, "bmc");
        let n: u32 = suffix.parse().unwrap();
        assert!((1..=9999).contains(&n));
    }

    #[test]
    fn object_path_is_prefixed() {
        assert_eq!(software_object_path("bmc_42"), "/software/bmc_42");
    }
}
