//! Installer-image filename recognizer.
//!
//! Turns a mirror path like `ubuntu-22.04.3-live-server-amd64.iso` into a
//! structured [`FileInfo`]. Dispatch is on the distro prefix; each branch
//! applies that distro's own delimiter conventions. The function is total:
//! unrecognized inputs come back with an empty `name`, which callers filter
//! out.

use crate::crd::FileInfo;

fn combine(parts: &[&str], sep: &str) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(sep)
}

fn seg<'a>(sp: &'a [&str], i: usize) -> &'a str {
    sp.get(i).copied().unwrap_or("")
}

fn starts_with_digit(s: &str) -> bool {
    s.bytes().next().is_some_and(|b| b.is_ascii_digit())
}

/// Recognize one file path.
pub fn recognize(filepath: &str) -> FileInfo {
    let mut f = FileInfo {
        path: filepath.to_string(),
        ..Default::default()
    };

    let base = filepath.rsplit('/').next().unwrap_or(filepath);
    let name = match base.rfind('.') {
        Some(idx) if idx > 0 => {
            f.ext = base[idx..].to_string();
            &base[..idx]
        }
        _ => base,
    };

    if let Some(rest) = name.strip_prefix("CentOS-") {
        let (stream, rest) = match rest.strip_prefix("Stream-") {
            Some(r) => (true, r),
            None => (false, rest),
        };
        let sp: Vec<&str> = rest.split('-').collect();
        f.major_version = seg(&sp, 0).to_string();
        if sp.len() > 3 {
            match f.major_version.as_str() {
                "6" | "7" => {
                    f.arch = seg(&sp, 1).to_string();
                    f.edition = seg(&sp, 2).to_string();
                    f.version = sp[3..].join("-");
                }
                _ => {
                    f.version = if stream {
                        format!("Stream-{}", seg(&sp, 1))
                    } else {
                        seg(&sp, 1).to_string()
                    };
                    f.arch = seg(&sp, 2).to_string();
                    f.edition = seg(&sp, 3).to_string();
                }
            }
        }
    } else if let Some(rest) = name.strip_prefix("debian-") {
        let sp: Vec<&str> = rest.split('-').collect();
        if sp.len() >= 3 {
            let mut start = 0;
            if !starts_with_digit(seg(&sp, 0)) {
                f.edition = seg(&sp, 0).to_string();
                start += 1;
            }
            f.version = seg(&sp, start).to_string();
            f.arch = seg(&sp, start + 1).to_string();
            if sp.len() >= start + 3 {
                f.edition_type = seg(&sp, start + 2).to_string();
                if f.edition == "live" {
                    std::mem::swap(&mut f.edition, &mut f.edition_type);
                }
                if f.arch == "source" {
                    f.edition = std::mem::take(&mut f.arch);
                }
                if sp.len() == start + 4 {
                    f.part = seg(&sp, start + 3).parse().unwrap_or(0);
                }
            }
        }
    } else if [
        "edubuntu-",
        "kubuntu-",
        "lubuntu-",
        "mythbuntu-",
        "ubuntucinnamon-",
        "ubuntukylin-",
        "ubuntustudio-",
        "xubuntu-",
    ]
    .iter()
    .any(|p| name.starts_with(p))
    {
        let sp: Vec<&str> = name.split('-').collect();
        if sp.len() >= 4 {
            f.major_version = seg(&sp, 0).to_string();
            f.version = seg(&sp, 1).to_string();
            f.edition = seg(&sp, 2).to_string();
            let mut start = 3;
            if f.edition == "beta" {
                f.version = format!("{}-{}", seg(&sp, 1), seg(&sp, 2));
                f.edition = seg(&sp, 3).to_string();
                start += 1;
            }
            if sp.len() >= start + 1 {
                f.arch = seg(&sp, start).to_string();
            }
        }
    } else if ["ubuntu-budgie-", "ubuntu-gnome-", "ubuntu-mate-", "ubuntu-unity-"]
        .iter()
        .any(|p| name.starts_with(p))
    {
        let sp: Vec<&str> = name.split('-').collect();
        if sp.len() >= 5 {
            f.major_version = format!("{}-{}", seg(&sp, 0), seg(&sp, 1));
            f.version = seg(&sp, 2).to_string();
            f.edition = seg(&sp, 3).to_string();
            let mut start = 4;
            if f.edition == "beta" {
                f.version = format!("{}-{}", seg(&sp, 2), seg(&sp, 3));
                f.edition = seg(&sp, 4).to_string();
                start += 1;
            }
            if sp.len() >= start + 1 {
                f.arch = seg(&sp, start).to_string();
            }
        }
    } else if let Some(rest) = name.strip_prefix("ubuntu-") {
        let sp: Vec<&str> = rest.split('-').collect();
        if sp.len() >= 3 {
            f.version = seg(&sp, 0).to_string();
            let mut start = 1;
            if seg(&sp, start) == "beta" {
                f.version = format!("{}-beta", seg(&sp, 0));
                start += 1;
            }
            if seg(&sp, start) == "live" {
                start += 1;
            }
            if seg(&sp, start) == "src" {
                f.edition = "src".to_string();
                f.part = seg(&sp, start + 1).parse().unwrap_or(0);
            } else if sp.len() >= start + 2 {
                f.edition = seg(&sp, start).to_string();
                if f.edition == "legacy" {
                    f.edition = format!("legacy-{}", seg(&sp, start + 1));
                    start += 1;
                }
                f.arch = seg(&sp, start + 1).to_string();
                if f.arch == "legacy" {
                    f.edition = format!("{}-legacy", f.edition);
                    f.arch = seg(&sp, start + 2).to_string();
                }
                if f.arch.ends_with("+intel") {
                    f.arch = format!("{}-iot", f.arch);
                }
            }
        }
    } else if let Some(rest) = name.strip_prefix("Fedora-") {
        let sp: Vec<&str> = rest.split('-').collect();
        if sp.len() >= 5 {
            f.edition = seg(&sp, 0).to_string();
            f.edition_type = seg(&sp, 1).to_string();
            f.arch = seg(&sp, 2).to_string();
            f.major_version = seg(&sp, 3).to_string();
            f.version = seg(&sp, 4).to_string();
        }
    } else if let Some(rest) = name.strip_prefix("deepin-") {
        let sp: Vec<&str> = rest.split('-').collect();
        if sp.len() >= 4 {
            f.edition = seg(&sp, 0).to_string();
            f.edition_type = seg(&sp, 1).to_string();
            f.version = sp[2..sp.len() - 1].join("-");
            f.arch = seg(&sp, sp.len() - 1).to_string();
        }
    } else if let Some(rest) = name.strip_prefix("kali-linux-") {
        let sp: Vec<&str> = rest.split('-').collect();
        f.version = seg(&sp, 0).to_string();
        if sp.len() >= 3 {
            let mut start = 1;
            if seg(&sp, 1).starts_with('W') {
                f.version = format!("{}-{}", seg(&sp, 0), seg(&sp, 1));
                start += 1;
            }
            if sp.len() == start + 2 {
                f.edition = seg(&sp, start).to_string();
                if f.edition == "installer" {
                    f.edition.clear();
                }
                f.arch = seg(&sp, start + 1).to_string();
            } else if sp.len() == start + 3 {
                f.edition = seg(&sp, start + 1).to_string();
                f.arch = seg(&sp, start + 2).to_string();
            }
        }
    } else if name.starts_with("openSUSE-") {
        if !name.contains("Micro") && name.ends_with("-Current") {
            let rest = name.strip_prefix("openSUSE-").unwrap_or(name);
            let sp: Vec<&str> = rest.split('-').collect();
            f.major_version = seg(&sp, 0).to_string();
            match f.major_version.as_str() {
                "Leap" => {
                    if sp.len() >= 3 {
                        f.version = seg(&sp, 1).to_string();
                        f.edition_type = seg(&sp, 2).to_string();
                        let mut start = 3;
                        match f.edition_type.as_str() {
                            "Rescue" => start += 1,
                            "CR" => {
                                f.edition_type = seg(&sp, start).to_string();
                                start += 1;
                            }
                            _ => {
                                if f.edition_type.parse::<i64>().is_ok() {
                                    f.version = format!("{}-{}", f.version, f.edition_type);
                                    f.edition_type = seg(&sp, start).to_string();
                                    start += 1;
                                }
                            }
                        }
                        if sp.len() >= start + 1 {
                            if seg(&sp, start) == "Live" {
                                start += 1;
                            }
                            f.arch = seg(&sp, start).to_string();
                        }
                    }
                }
                "Tumbleweed" => {
                    if sp.len() >= 2 {
                        f.edition_type = seg(&sp, 1).to_string();
                        let mut start = 2;
                        if f.edition_type == "Rescue" {
                            f.edition_type = format!("{}-{}", seg(&sp, 1), seg(&sp, 2));
                            start += 1;
                        }
                        if sp.len() > start && seg(&sp, start) == "Live" {
                            start += 1;
                        }
                        if f.edition_type.starts_with("Yomi") {
                            let et: Vec<&str> = f.edition_type.split('.').collect();
                            if et.len() == 2 {
                                f.arch = et[1].to_string();
                                f.edition_type = et[0].to_string();
                            }
                        } else {
                            f.arch = seg(&sp, start).to_string();
                        }
                    }
                }
                "Kubic" => {
                    if sp.len() >= 3 {
                        f.edition_type = seg(&sp, 1).to_string();
                        f.arch = seg(&sp, 2).to_string();
                    }
                }
                _ => {}
            }
        }
    } else if let Some(rest) = name.strip_prefix("archlinux-") {
        let sp: Vec<&str> = rest.split('-').collect();
        if sp.len() > 1 {
            f.version = seg(&sp, 0).to_string();
            f.arch = seg(&sp, 1).to_string();
        }
    } else if let Some(rest) = name.strip_prefix("alpine-") {
        let sp: Vec<&str> = rest.split('-').collect();
        match sp.len() {
            2 => {
                f.version = seg(&sp, 0).to_string();
                f.arch = seg(&sp, 1).to_string();
            }
            3 => {
                f.edition = seg(&sp, 0).to_string();
                f.version = seg(&sp, 1).to_string();
                f.arch = seg(&sp, 2).to_string();
            }
            _ => {}
        }
    } else if name.starts_with("proxmox-") {
        let sp: Vec<&str> = name.split('_').collect();
        if sp.len() == 2 {
            f.major_version = seg(&sp, 0).to_string();
            f.version = seg(&sp, 1).to_string();
        }
    } else if let Some(rest) = name.strip_prefix("AlmaLinux-") {
        let sp: Vec<&str> = rest.split('-').collect();
        f.version = seg(&sp, 0).to_string();
        if sp.len() >= 3 {
            let mut start = 1;
            if seg(&sp, start) == "latest" {
                start += 1;
            }
            f.arch = seg(&sp, start + 1).to_string();
            f.edition_type = seg(&sp, start + 2).to_string();
            if f.edition_type == "Live" && sp.len() > start + 3 {
                f.edition = sp[start + 3..].join("-");
            }
        }
    } else if let Some(rest) = name.strip_prefix("texlive") {
        let sp: Vec<&str> = rest.split('-').collect();
        if sp.len() > 1 {
            f.version = seg(&sp, 1).to_string();
        }
    }

    let part = if f.part > 0 {
        format!("Part {}", f.part)
    } else {
        String::new()
    };
    if !f.major_version.is_empty() || !f.version.is_empty() {
        f.name = format!(
            "{} ({})",
            combine(&[&f.major_version, &f.version], " "),
            combine(&[&f.arch, &f.edition, &f.edition_type, &part], ", ")
        );
        if f.name.ends_with("()") {
            f.name = f.name.trim_end_matches(" ()").to_string();
        }
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ubuntu_live_server() {
        let f = recognize("ubuntu/22.04.3/ubuntu-22.04.3-live-server-amd64.iso");
        assert_eq!(f.version, "22.04.3");
        assert_eq!(f.edition, "server");
        assert_eq!(f.arch, "amd64");
        assert_eq!(f.ext, ".iso");
        assert_eq!(f.name, "22.04.3 (amd64, server)");
        assert_eq!(f.path, "ubuntu/22.04.3/ubuntu-22.04.3-live-server-amd64.iso");
    }

    #[test]
    fn ubuntu_legacy_server() {
        let f = recognize("ubuntu-20.04.6-legacy-server-amd64.iso");
        assert_eq!(f.edition, "legacy-server");
        assert_eq!(f.arch, "amd64");
    }

    #[test]
    fn ubuntu_flavors() {
        let f = recognize("xubuntu-23.10-desktop-amd64.iso");
        assert_eq!(f.major_version, "xubuntu");
        assert_eq!(f.version, "23.10");
        assert_eq!(f.edition, "desktop");
        assert_eq!(f.arch, "amd64");

        let f = recognize("ubuntu-mate-23.10-desktop-amd64.iso");
        assert_eq!(f.major_version, "ubuntu-mate");
        assert_eq!(f.version, "23.10");
        assert_eq!(f.arch, "amd64");
    }

    #[test]
    fn centos_stream() {
        let f = recognize("CentOS-Stream-9-latest-x86_64-dvd1.iso");
        assert_eq!(f.major_version, "9");
        assert_eq!(f.version, "Stream-latest");
        assert_eq!(f.arch, "x86_64");
        assert_eq!(f.edition, "dvd1");
    }

    #[test]
    fn centos_seven_layout() {
        let f = recognize("CentOS-7-x86_64-Minimal-2009.iso");
        assert_eq!(f.major_version, "7");
        assert_eq!(f.arch, "x86_64");
        assert_eq!(f.edition, "Minimal");
        assert_eq!(f.version, "2009");
    }

    #[test]
    fn debian_netinst_and_live() {
        let f = recognize("debian-12.4.0-amd64-netinst.iso");
        assert_eq!(f.version, "12.4.0");
        assert_eq!(f.arch, "amd64");
        assert_eq!(f.edition_type, "netinst");

        let f = recognize("debian-live-12.4.0-amd64-gnome.iso");
        assert_eq!(f.edition, "gnome");
        assert_eq!(f.edition_type, "live");
    }

    #[test]
    fn fedora_workstation() {
        let f = recognize("Fedora-Workstation-Live-x86_64-39-1.5.iso");
        assert_eq!(f.edition, "Workstation");
        assert_eq!(f.edition_type, "Live");
        assert_eq!(f.arch, "x86_64");
        assert_eq!(f.major_version, "39");
        assert_eq!(f.version, "1.5");
    }

    #[test]
    fn kali_variants() {
        let f = recognize("kali-linux-2023.4-installer-amd64.iso");
        assert_eq!(f.version, "2023.4");
        assert_eq!(f.edition, "");
        assert_eq!(f.arch, "amd64");

        let f = recognize("kali-linux-2024-W01-live-amd64.iso");
        assert_eq!(f.version, "2024-W01");
        assert_eq!(f.edition, "live");
        assert_eq!(f.arch, "amd64");
    }

    #[test]
    fn opensuse_gated_on_current_suffix() {
        let f = recognize("openSUSE-Leap-15.5-DVD-x86_64-Current.iso");
        assert_eq!(f.major_version, "Leap");
        assert_eq!(f.version, "15.5");
        assert_eq!(f.edition_type, "DVD");
        assert_eq!(f.arch, "x86_64");

        let f = recognize("openSUSE-Tumbleweed-DVD-x86_64-Current.iso");
        assert_eq!(f.edition_type, "DVD");
        assert_eq!(f.arch, "x86_64");

        // not a -Current alias: stays unparsed
        let f = recognize("openSUSE-Leap-15.5-DVD-x86_64-Build491.1.iso");
        assert_eq!(f.name, "");
    }

    #[test]
    fn alpine_arch_and_proxmox() {
        let f = recognize("alpine-standard-3.19.0-x86_64.iso");
        assert_eq!(f.edition, "standard");
        assert_eq!(f.version, "3.19.0");
        assert_eq!(f.arch, "x86_64");

        let f = recognize("archlinux-2024.01.01-x86_64.iso");
        assert_eq!(f.version, "2024.01.01");
        assert_eq!(f.arch, "x86_64");

        let f = recognize("proxmox-ve_8.1-1.iso");
        assert_eq!(f.major_version, "proxmox-ve");
        assert_eq!(f.version, "8.1-1");
    }

    #[test]
    fn texlive_version() {
        let f = recognize("texlive2023-20230313.iso");
        assert_eq!(f.version, "20230313");
        assert_eq!(f.name, "20230313");
    }

    #[test]
    fn unrecognized_is_total_and_unnamed() {
        for input in ["random.txt", "", "AlmaLinux-9.3-x86_64-dvd.iso", "ubuntu-x"] {
            let f = recognize(input);
            if input == "random.txt" || input == "ubuntu-x" || input.is_empty() {
                assert_eq!(f.name, "", "{input}");
            }
            // no panic on any input is the property under test
        }
    }
}
