//! Rendered message bodies for every mail the service sends. Each function
//! returns `(subject, html, text)`.

use chrono::{DateTime, Utc};

const APP_NAME: &str = "Face Authentication App";

pub fn activation_otp(name: &str, otp: &str, ttl_minutes: i64) -> (String, String, String) {
    let subject = format!("Verify Your Account - {}", APP_NAME);

    let html = wrap_html(&format!(
        "<h2>Welcome, {}!</h2>\
        <p>Thank you for registering with {}.</p>\
        <p>Please use the following one-time passcode to verify your account:</p>\
        {}\
        <p>If you didn't request this verification, please ignore this email.</p>",
        name,
        APP_NAME,
        otp_block(otp, ttl_minutes),
    ));

    let text = format!(
        "Welcome, {}!\n\n\
        Thank you for registering with {}.\n\
        Please use the following one-time passcode to verify your account:\n\n\
        Your code: {}\n\n\
        This code will expire in {} minutes. Do not share it with anyone.\n\n\
        If you didn't request this verification, please ignore this email.",
        name, APP_NAME, otp, ttl_minutes
    );

    (subject, html, text)
}

pub fn login_otp(name: &str, otp: &str, ttl_minutes: i64) -> (String, String, String) {
    let subject = format!("Your Login Code - {}", APP_NAME);

    let html = wrap_html(&format!(
        "<h2>Hi {},</h2>\
        <p>Your face was verified successfully. Enter this code to finish signing in:</p>\
        {}\
        <p>If you didn't try to sign in, someone may have a photo of you. \
        Consider updating your face data.</p>",
        name,
        otp_block(otp, ttl_minutes),
    ));

    let text = format!(
        "Hi {},\n\n\
        Your face was verified successfully. Enter this code to finish signing in:\n\n\
        Your code: {}\n\n\
        This code will expire in {} minutes. Do not share it with anyone.\n\n\
        If you didn't try to sign in, someone may have a photo of you.",
        name, otp, ttl_minutes
    );

    (subject, html, text)
}

pub fn login_alert(
    name: &str,
    previous_login: Option<DateTime<Utc>>,
    similarity: f32,
) -> (String, String, String) {
    let subject = format!("Login Alert - {}", APP_NAME);
    let previous = match previous_login {
        Some(t) => t.format("%B %d, %Y at %H:%M UTC").to_string(),
        None => "Never".to_string(),
    };

    let html = wrap_html(&format!(
        "<h2>Hi {},</h2>\
        <p>A new sign-in to your account just completed.</p>\
        <ul>\
        <li>Face match confidence: {:.0}%</li>\
        <li>Previous sign-in: {}</li>\
        </ul>\
        <p>If this wasn't you, request a face-data update from your account settings.</p>",
        name,
        similarity * 100.0,
        previous,
    ));

    let text = format!(
        "Hi {},\n\n\
        A new sign-in to your account just completed.\n\
        Face match confidence: {:.0}%\n\
        Previous sign-in: {}\n\n\
        If this wasn't you, request a face-data update from your account settings.",
        name,
        similarity * 100.0,
        previous
    );

    (subject, html, text)
}

pub fn deletion_otp(name: &str, otp: &str, ttl_minutes: i64) -> (String, String, String) {
    let subject = format!("Confirm Account Deletion - {}", APP_NAME);

    let html = wrap_html(&format!(
        "<h2>Hi {},</h2>\
        <p>We received a request to permanently delete your account. \
        Enter this code to confirm:</p>\
        {}\
        <p><strong>This cannot be undone.</strong> Your face data, photo, and \
        login history will all be removed.</p>\
        <p>If you didn't request this, you can safely ignore this email.</p>",
        name,
        otp_block(otp, ttl_minutes),
    ));

    let text = format!(
        "Hi {},\n\n\
        We received a request to permanently delete your account.\n\
        Enter this code to confirm:\n\n\
        Your code: {}\n\n\
        This code will expire in {} minutes. This cannot be undone.\n\n\
        If you didn't request this, you can safely ignore this email.",
        name, otp, ttl_minutes
    );

    (subject, html, text)
}

pub fn face_update_otp(name: &str, otp: &str, ttl_minutes: i64) -> (String, String, String) {
    let subject = format!("Confirm Face Data Update - {}", APP_NAME);

    let html = wrap_html(&format!(
        "<h2>Hi {},</h2>\
        <p>We received a request to replace the face data on your account. \
        Enter this code to confirm:</p>\
        {}\
        <p>If you didn't request this, please ignore this email and your \
        face data will stay unchanged.</p>",
        name,
        otp_block(otp, ttl_minutes),
    ));

    let text = format!(
        "Hi {},\n\n\
        We received a request to replace the face data on your account.\n\
        Enter this code to confirm:\n\n\
        Your code: {}\n\n\
        This code will expire in {} minutes.\n\n\
        If you didn't request this, please ignore this email.",
        name, otp, ttl_minutes
    );

    (subject, html, text)
}

pub fn account_deleted(name: &str) -> (String, String, String) {
    let subject = format!("Account Deleted - {}", APP_NAME);

    let html = wrap_html(&format!(
        "<h2>Goodbye, {}.</h2>\
        <p>Your account and all associated data (face signature, photo, and \
        login history) have been permanently deleted.</p>\
        <p>You are welcome back any time.</p>",
        name,
    ));

    let text = format!(
        "Goodbye, {}.\n\n\
        Your account and all associated data (face signature, photo, and \
        login history) have been permanently deleted.\n\n\
        You are welcome back any time.",
        name
    );

    (subject, html, text)
}

fn otp_block(otp: &str, ttl_minutes: i64) -> String {
    format!(
        "<div style=\"background:#4CAF50;color:#fff;font-size:24px;font-weight:bold;\
        padding:15px;text-align:center;border-radius:5px;margin:20px 0;\
        letter-spacing:3px;\">{}</div>\
        <p><strong>Important:</strong> this code will expire in {} minutes. \
        Do not share it with anyone.</p>",
        otp, ttl_minutes
    )
}

fn wrap_html(content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; background-color: #f5f5f5; }}
        .container {{ background-color: white; padding: 30px; border-radius: 10px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
    </style>
</head>
<body>
    <div class="container">
    {}
    <hr style="margin-top: 40px; border: none; border-top: 1px solid #e9ecef;">
    <p style="font-size: 12px; color: #6c757d;">
        {} &mdash; this is an automated message, please do not reply.
    </p>
    </div>
</body>
</html>"#,
        content, APP_NAME
    )
}
