#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::TarXz => "tar.xz",
        }
    }

    /// Decompression switch passed to `tar`.
    pub fn tar_flag(self) -> &'static str {
        match self {
            Self::TarGz => "-z",
            Self::TarBz2 => "-j",
            Self::TarXz => "-J",
        }
    }

    pub fn infer_from_url(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        let without_fragment = lower.split('#').next().unwrap_or(&lower);
        let path = without_fragment
            .split('?')
            .next()
            .unwrap_or(without_fragment);

        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            return Some(Self::TarGz);
        }
        if path.ends_with(".tar.bz2") || path.ends_with(".tbz2") {
            return Some(Self::TarBz2);
        }
        if path.ends_with(".tar.xz") || path.ends_with(".txz") {
            return Some(Self::TarXz);
        }
        None
    }
}

/// File name an archive URL is saved under, like `curl --remote-name`.
pub fn remote_file_name(url: &str) -> Option<&str> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let path = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}
