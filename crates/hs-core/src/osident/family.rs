//! Distribution family derivation from release filenames.
//!
//! Last-resort mapping used when no release file or command supplied a
//! family name: the stem of the matched `/etc/*-release` filename is
//! looked up in a table of historically known distributions. The table
//! is preserved as encountered in the field and is deliberately not
//! extended for newer distributions; anything unknown is title-cased as
//! a best effort.

/// Reduce a release filename to its lookup stem.
///
/// Strips the `/etc/` prefix and the `release`/`version` decorations,
/// e.g. `/etc/redhat-release` -> `redhat`.
pub fn filename_stem(filename: &str) -> String {
    filename
        .replace("/etc/", "")
        .replace("release", "")
        .replace("version", "")
        .replace('-', "")
        .replace('_', "")
}

/// Convert a filename stem to a mixed-case family name.
pub fn filename_to_family(name: &str) -> String {
    match name.to_lowercase().as_str() {
        // Handle known special cases
        "" => "Solaris".to_string(),
        "blackcat" => "Black Cat".to_string(),
        "bluewhite64" => "BlueWhite64".to_string(),
        "e-smith" => "SME Server".to_string(),
        "eos" => "FreeEOS".to_string(),
        "hlfs" => "HLFS".to_string(),
        "lfs" => "Linux-From-Scratch".to_string(),
        "linuxppc" => "Linux-PPC".to_string(),
        "meego" => "MeeGo".to_string(),
        "mandakelinux" => "Mandrake".to_string(),
        "mklinux" => "MkLinux".to_string(),
        "nld" => "Novell Linux Desktop".to_string(),
        "novell" | "suse" => "SUSE Linux".to_string(),
        "pld" => "PLD".to_string(),
        "redhat" => "Red Hat Linux".to_string(),
        "sles" => "SUSE Linux ES9".to_string(),
        "sun" => "Sun JDS".to_string(),
        "synoinfo" => "Synology".to_string(),
        "tinysofa" => "Tiny Sofa".to_string(),
        "turbolinux" => "TurboLinux".to_string(),
        "ultrapenguin" => "UltraPenguin".to_string(),
        "va" => "VA-Linux".to_string(),
        "vmware" => "VMWareESX".to_string(),
        "yellowdog" => "Yellow Dog".to_string(),

        // The /etc/issue last resort ends up here
        "issue" => "Unknown".to_string(),

        // Not a special case: capitalize the first letter
        _ => {
            let mut chars = name.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => "Solaris".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_stem_strips_decorations() {
        assert_eq!(filename_stem("/etc/redhat-release"), "redhat");
        assert_eq!(filename_stem("/etc/slackware_version"), "slackware");
        assert_eq!(filename_stem("/etc/release"), "");
        assert_eq!(filename_stem("/etc/issue"), "issue");
    }

    #[test]
    fn test_known_historical_families() {
        assert_eq!(filename_to_family("redhat"), "Red Hat Linux");
        assert_eq!(filename_to_family("sles"), "SUSE Linux ES9");
        assert_eq!(filename_to_family("novell"), "SUSE Linux");
        assert_eq!(filename_to_family("yellowdog"), "Yellow Dog");
        assert_eq!(filename_to_family(""), "Solaris");
        assert_eq!(filename_to_family("issue"), "Unknown");
    }

    #[test]
    fn test_unknown_stem_is_title_cased() {
        assert_eq!(filename_to_family("slackware"), "Slackware");
        assert_eq!(filename_to_family("gentoo"), "Gentoo");
    }
}
