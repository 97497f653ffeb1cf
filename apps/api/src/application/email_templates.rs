use url::Url;

const BRAND_NAME: &str = "Pairly";

fn origin_label(app_origin: &str) -> String {
    Url::parse(app_origin)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .unwrap_or_else(|| app_origin.to_string())
}

fn code_block(otp: &str) -> String {
    format!(
        r#"<p style="margin:16px 0;font-size:28px;letter-spacing:0.3em;font-weight:700;color:#111827;">{otp}</p>"#
    )
}

pub fn verification_otp_email(app_origin: &str, otp: &str, ttl_minutes: i64) -> (String, String) {
    let subject = format!("Your {} verification code", BRAND_NAME);
    let lead = "Use this code to verify your email address.";
    let body = format!(
        r#"{code}<p style="margin:0;color:#374151;">The code expires in {ttl_minutes} minutes.</p>"#,
        code = code_block(otp),
    );
    let html = wrap_email(app_origin, "Verify your email", lead, &body, "you signed up or signed in");
    (subject, html)
}

pub fn password_reset_otp_email(app_origin: &str, otp: &str, ttl_minutes: i64) -> (String, String) {
    let subject = format!("Reset your {} password", BRAND_NAME);
    let lead = "Use this code to choose a new password.";
    let body = format!(
        r#"{code}<p style="margin:0;color:#374151;">The code expires in {ttl_minutes} minutes.</p>"#,
        code = code_block(otp),
    );
    let html = wrap_email(app_origin, "Password reset", lead, &body, "someone asked to reset your password");
    (subject, html)
}

fn wrap_email(app_origin: &str, headline: &str, lead: &str, body_html: &str, reason: &str) -> String {
    let origin = origin_label(app_origin);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <body style="background:#fdf2f8;margin:0;padding:24px;font-family:Arial,Helvetica,sans-serif;">
    <div style="max-width:520px;margin:0 auto;background:#ffffff;border:1px solid #fbcfe8;border-radius:12px;padding:24px;">
      <div style="font-size:12px;text-transform:uppercase;color:#9d174d;">{brand} - {origin}</div>
      <h1 style="margin:12px 0 8px;font-size:22px;color:#111827;">{headline}</h1>
      <p style="margin:0;font-size:15px;color:#111827;">{lead}</p>
      {body_html}
      <p style="margin-top:20px;font-size:13px;color:#6b7280;">You got this email because {reason}. If that wasn't you, ignore it.</p>
    </div>
  </body>
</html>
"#,
        brand = BRAND_NAME,
    )
}
