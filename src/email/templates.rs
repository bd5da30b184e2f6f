pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn reset_password_email(reset_link: &str, valid_for_minutes: i64) -> RenderedEmail {
    let text = format!(
        "You recently requested to reset the password for your account.\n\
         Open the link below to proceed:\n\n\
         {reset_link}\n\n\
         If you did not request a password reset, you can ignore this email. \
         This link is only valid for the next {valid_for_minutes} minutes.\n"
    );

    let link = escape_html(reset_link);
    let html = format!(
        "<!DOCTYPE html><html><body>\
         <p>You recently requested to reset the password for your account. \
         Click the button below to proceed.</p>\
         <p><a href=\"{link}\">Reset password</a></p>\
         <p>If you did not request a password reset, you can ignore this email. \
         This link is only valid for the next {valid_for_minutes} minutes.</p>\
         </body></html>"
    );

    RenderedEmail {
        subject: "Reset your password".into(),
        text,
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_bodies_carry_the_link() {
        let link = "https://app.test/reset-password?token=abcd";
        let email = reset_password_email(link, 60);
        assert_eq!(email.subject, "Reset your password");
        assert!(email.text.contains(link));
        assert!(email.html.contains(link));
        assert!(email.text.contains("60 minutes"));
    }

    #[test]
    fn html_link_is_escaped() {
        let email = reset_password_email("https://x.test/?a=1&b=\"2\"", 60);
        assert!(email.html.contains("a=1&amp;b=&quot;2&quot;"));
    }
}
