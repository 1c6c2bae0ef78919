//! Minimal HTML pages for the owner-action links and classic form posts.
//! Owners open these from an email on a phone; the pages carry one message
//! and no further links.

use villa_flow::notify::templates::escape_html;
use villa_flow::pricing::format_money;

pub(crate) fn page(title: &str, heading: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <title>{title}</title></head>\
         <body style=\"font-family:Arial,Helvetica,sans-serif;color:#1f2933;max-width:520px;margin:48px auto;padding:0 16px\">\
         <h1 style=\"color:#0b3d66;font-size:22px\">{heading}</h1>{body}</body></html>"
    )
}

pub(crate) fn approval_page(
    guest_name: &str,
    price: f64,
    currency: &str,
    payment_link_created: bool,
) -> String {
    let detail = if payment_link_created {
        format!(
            "<p>{} has been emailed a secure payment link for <strong>{}</strong>. \
             You will be notified as soon as the payment is in.</p>",
            escape_html(guest_name),
            format_money(price, currency)
        )
    } else {
        format!(
            "<p>The inquiry from {} is approved, but the payment link could not be \
             created. Our team has been notified and will send it manually.</p>",
            escape_html(guest_name)
        )
    };
    page("Inquiry approved", "Inquiry approved ✓", &detail)
}

pub(crate) fn decline_page(guest_name: &str) -> String {
    page(
        "Inquiry declined",
        "Inquiry declined",
        &format!(
            "<p>{} has been informed that the dates are not available. \
             No further action is needed.</p>",
            escape_html(guest_name)
        ),
    )
}

pub(crate) fn already_processed_page(status_label: &str) -> String {
    page(
        "Already processed",
        "Nothing to do",
        &format!(
            "<p>This inquiry was already handled; its current status is \
             <strong>{}</strong>. The link you clicked has no further effect.</p>",
            escape_html(status_label)
        ),
    )
}

pub(crate) fn invalid_link_page() -> String {
    page(
        "Link not valid",
        "This link is no longer valid",
        "<p>The link may have expired or been altered. If you still need to act on \
         this inquiry, please use the dashboard or contact the team.</p>",
    )
}

pub(crate) fn not_found_page() -> String {
    page(
        "Not found",
        "Inquiry not found",
        "<p>We could not find the inquiry this link refers to.</p>",
    )
}

pub(crate) fn error_page() -> String {
    page(
        "Something went wrong",
        "Something went wrong",
        "<p>We could not process your request right now. Please try again in a \
         few minutes.</p>",
    )
}
