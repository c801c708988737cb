//! Sign-off stripping and the HTML signature block.

use std::sync::LazyLock;

use mailcadence_core::traits::Signature;
use regex::Regex;

/// A closing phrase plus everything after it, with the markup leading into it.
static SIGN_OFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:<br\s*/?>|</?p>|\s)*(?:Best regards|Sincerely|Warm regards|Regards)[\s\S]*$")
        .expect("sign-off pattern")
});

/// Remove a generated sign-off and everything after it.
pub fn strip_sign_off(body: &str) -> String {
    SIGN_OFF.replace(body, "").into_owned()
}

/// HTML signature block; empty when neither name nor role is set.
pub fn render_signature(sig: &Signature) -> String {
    if sig.is_empty() {
        return String::new();
    }
    let links: Vec<String> = [
        ("🌐", &sig.portfolio, "Portfolio"),
        ("🔗", &sig.linkedin, "LinkedIn"),
        ("🧑‍💻", &sig.github, "GitHub"),
    ]
    .into_iter()
    .filter(|(_, url, _)| !url.is_empty())
    .map(|(icon, url, label)| format!("{icon} <a href=\"{url}\">{label}</a>"))
    .collect();

    let mut html = String::from(
        "\n<br><br>\n<hr style=\"border: none; border-top: 1px solid #ccc; margin: 20px 0;\">\n\
         <div style=\"font-family: Arial, sans-serif; line-height: 1.5;\">\n",
    );
    html.push_str(&format!("  <strong>{}</strong><br>\n  {}<br><br>\n", sig.name, sig.role));
    if !sig.phone.is_empty() {
        html.push_str(&format!("  📲 {}<br>\n", sig.phone));
    }
    if !links.is_empty() {
        html.push_str(&format!("  {}\n", links.join(" | ")));
    }
    html.push_str("</div>\n");
    html
}

/// Generated body with any sign-off removed and the signature appended.
pub fn finish_body(body: &str, sig: &Signature) -> String {
    let mut out = strip_sign_off(body);
    out.push_str(&render_signature(sig));
    out
}
