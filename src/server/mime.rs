/// Content type used when no mapping matches
pub const DEFAULT_MIME: &'static str = "text/plain";

const DEFAULT_MAPS: &'static [(&'static str, &'static str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("xml", "text/xml"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("ico", "image/x-icon"),
    ("pdf", "application/pdf"),
];

/// File extension to content type table
///
/// Application overrides are consulted before the built-in entries.
#[derive(Debug, Default, Clone)]
pub struct MimeMap {
    overrides: Vec<(String, String)>,
}

impl MimeMap {
    pub fn new() -> MimeMap {
        MimeMap::default()
    }

    pub fn set_overrides(&mut self, overrides: Vec<(String, String)>) {
        self.overrides = overrides;
    }

    /// Content type for the extension of the last path component
    pub fn lookup(&self, resource: &str) -> &str {
        let name = resource.rsplit('/').next().unwrap_or(resource);
        let ext = match name.rfind('.') {
            Some(dot) => &name[dot + 1..],
            None => return DEFAULT_MIME,
        };
        self.overrides.iter()
            .find(|&&(ref e, _)| e.eq_ignore_ascii_case(ext))
            .map(|&(_, ref mime)| &mime[..])
            .or_else(|| DEFAULT_MAPS.iter()
                .find(|&&(e, _)| e.eq_ignore_ascii_case(ext))
                .map(|&(_, mime)| mime))
            .unwrap_or(DEFAULT_MIME)
    }
}

#[cfg(test)]
mod test {
    use super::MimeMap;

    #[test]
    fn builtin() {
        let map = MimeMap::new();
        assert_eq!(map.lookup("/index.html"), "text/html");
        assert_eq!(map.lookup("/img/LOGO.PNG"), "image/png");
        assert_eq!(map.lookup("/data"), "text/plain");
        assert_eq!(map.lookup("/dir.d/file"), "text/plain");
        assert_eq!(map.lookup("/archive.xyz"), "text/plain");
    }

    #[test]
    fn overrides_first() {
        let mut map = MimeMap::new();
        map.set_overrides(vec![
            ("html".to_string(), "application/xhtml+xml".to_string()),
            ("xyz".to_string(), "chemical/x-xyz".to_string()),
        ]);
        assert_eq!(map.lookup("/index.html"), "application/xhtml+xml");
        assert_eq!(map.lookup("/m.xyz"), "chemical/x-xyz");
        assert_eq!(map.lookup("/a.gif"), "image/gif");
    }
}
