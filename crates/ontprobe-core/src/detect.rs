// ── Device family detection ──
//
// Classifies a device from its unauthenticated landing page so the trial
// state machine knows which adapters and credential lists to try first.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use ontprobe_api::AdapterVariant;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceFamily {
    Fiberhome,
    Huawei,
    Zte,
    Grandstream,
    Generic,
}

impl DeviceFamily {
    /// Adapter variants worth trying, most likely first.
    pub fn candidate_variants(self) -> Vec<AdapterVariant> {
        match self {
            Self::Fiberhome => vec![AdapterVariant::AjaxSession],
            Self::Zte => vec![AdapterVariant::XmlOverUi],
            Self::Grandstream => vec![AdapterVariant::HtmlScrape],
            Self::Huawei | Self::Generic => vec![
                AdapterVariant::AjaxSession,
                AdapterVariant::XmlOverUi,
                AdapterVariant::HtmlScrape,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub family: DeviceFamily,
    /// Model string visible before login; informational only.
    pub model_hint: Option<String>,
}

impl Detection {
    pub fn generic() -> Self {
        Self {
            family: DeviceFamily::Generic,
            model_hint: None,
        }
    }
}

static TITLE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<title>\s*([^<]+?)\s*</title>").ok());
static PRODUCT_NAME_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)var\s+ProductName\s*=\s*['"]([^'"]+)['"]"#).ok()
});

fn capture(re: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    re.as_ref()?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Some firmware prints hyphens as a literal `\x2d` escape.
pub fn repair_escaped_hyphen(raw: &str) -> String {
    raw.replace("\\x2d", "-").replace("\\X2D", "-")
}

/// Classify a landing page body and its `Server` header.
pub fn classify_landing_page(html: &str, server: Option<&str>) -> Detection {
    let lower = html.to_lowercase();
    let server = server.unwrap_or_default().to_lowercase();
    let any = |markers: &[&str], text: &str| markers.iter().any(|m| text.contains(m));

    if lower.contains("grandstream") || server.contains("grandstream") || lower.contains("ht818") {
        return Detection {
            family: DeviceFamily::Grandstream,
            model_hint: lower.contains("ht818").then(|| "HT818".to_owned()),
        };
    }

    if any(
        &["fiberhome", "hg6145f", "user_name", "loginpp", "fh-text-security"],
        &lower,
    ) {
        let model_hint = if lower.contains("hg6145f1") {
            Some("HG6145F1".to_owned())
        } else if lower.contains("hg6145f") {
            Some("HG6145F".to_owned())
        } else {
            None
        };
        return Detection {
            family: DeviceFamily::Fiberhome,
            model_hint,
        };
    }

    let compact: String = lower.chars().filter(|c| !c.is_whitespace()).collect();
    if any(&["huawei", "hg8145", "txt_username", "txt_password"], &compact) {
        let model_hint = capture(&PRODUCT_NAME_RE, html)
            .or_else(|| capture(&TITLE_RE, html))
            .map(|m| repair_escaped_hyphen(&m));
        return Detection {
            family: DeviceFamily::Huawei,
            model_hint,
        };
    }

    if any(&["zte", "zxhn", "f670l", "frm_username", "frm_password"], &lower) {
        return Detection {
            family: DeviceFamily::Zte,
            model_hint: lower.contains("f670l").then(|| "F670L".to_owned()),
        };
    }

    Detection::generic()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn grandstream_by_server_header() {
        let d = classify_landing_page("<html>Login</html>", Some("Grandstream/1.10"));
        assert_eq!(d.family, DeviceFamily::Grandstream);
        assert_eq!(d.family.candidate_variants(), vec![AdapterVariant::HtmlScrape]);
    }

    #[test]
    fn fiberhome_variant_hint() {
        let d = classify_landing_page("<input id=\"user_name\"><!-- HG6145F1 -->", None);
        assert_eq!(d.family, DeviceFamily::Fiberhome);
        assert_eq!(d.model_hint.as_deref(), Some("HG6145F1"));
    }

    #[test]
    fn huawei_product_name_is_repaired() {
        let page = r"<script>var ProductName = 'HG8145X6\x2d10';</script><input id=txt_Username>";
        let d = classify_landing_page(page, None);
        assert_eq!(d.family, DeviceFamily::Huawei);
        assert_eq!(d.model_hint.as_deref(), Some("HG8145X6-10"));
    }

    #[test]
    fn huawei_title_fallback() {
        let d = classify_landing_page("<title> HG8145V5 </title><b>HUAWEI</b>", None);
        assert_eq!(d.model_hint.as_deref(), Some("HG8145V5"));
    }

    #[test]
    fn zte_login_form() {
        let d = classify_landing_page("<input id=\"Frm_Username\">", None);
        assert_eq!(d.family, DeviceFamily::Zte);
        assert_eq!(d.family.candidate_variants(), vec![AdapterVariant::XmlOverUi]);
    }

    #[test]
    fn unknown_page_is_generic() {
        let d = classify_landing_page("<html><body>router</body></html>", None);
        assert_eq!(d, Detection::generic());
        assert_eq!(d.family.candidate_variants().len(), 3);
    }
}
