//! Pure message composition. Every guest-supplied string is HTML-escaped
//! before it reaches a body; templates never see routing configuration, so
//! the internal operator address cannot appear in rendered content.

use chrono::NaiveDate;

use crate::notify::OutboundContent;
use crate::pricing::{format_money, format_quote, QuoteBreakdown};
use crate::store::Inquiry;

/// Minimal entity escaping for interpolated user content.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn lang_tag(lang: &str) -> &'static str {
    match lang {
        "fr" => "[FR]",
        "es" => "[ES]",
        _ => "[EN]",
    }
}

fn date_range(check_in: NaiveDate, check_out: NaiveDate) -> String {
    format!("{} to {}", check_in, check_out)
}

// Titles carry the villa name, which falls back to a form field when the
// slug lookup misses, so they get escaped here like any other guest input.
fn wrap_html(title: &str, inner: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Arial,Helvetica,sans-serif;color:#1f2933;max-width:640px;margin:0 auto;padding:16px\">\
         <h2 style=\"color:#0b3d66\">{title}</h2>{inner}</body></html>"
    )
}

fn detail_row(label: &str, value: &str) -> String {
    format!(
        "<tr><td style=\"padding:4px 12px 4px 0;color:#52606d\">{label}</td>\
         <td style=\"padding:4px 0\"><strong>{value}</strong></td></tr>"
    )
}

/// Everything the operator needs to act on a new lead, composed at intake
/// time from the validated form rather than the stored record so the
/// adults/children split and request metadata survive into the email.
#[derive(Debug, Clone)]
pub struct OwnerNotice<'a> {
    pub villa_name: &'a str,
    pub lang: &'a str,
    pub guest_name: &'a str,
    pub guest_email: &'a str,
    pub guest_phone: Option<&'a str>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u32,
    pub children: u32,
    pub notes: Option<&'a str>,
    pub occasion: Option<&'a str>,
    pub quote: Option<&'a QuoteBreakdown>,
    pub approve_url: Option<&'a str>,
    pub decline_url: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub ip: Option<&'a str>,
}

pub fn owner_notice(notice: &OwnerNotice<'_>) -> OutboundContent {
    let subject = format!(
        "{} New inquiry: {} — {} ({})",
        lang_tag(notice.lang),
        escape_subject(notice.guest_name),
        notice.villa_name,
        date_range(notice.check_in, notice.check_out),
    );

    let mut rows = String::new();
    rows.push_str(&detail_row("Guest", &escape_html(notice.guest_name)));
    rows.push_str(&detail_row("Email", &escape_html(notice.guest_email)));
    if let Some(phone) = notice.guest_phone {
        rows.push_str(&detail_row("Phone", &escape_html(phone)));
    }
    rows.push_str(&detail_row(
        "Dates",
        &date_range(notice.check_in, notice.check_out),
    ));
    rows.push_str(&detail_row(
        "Party",
        &format!("{} adults, {} children", notice.adults, notice.children),
    ));
    if let Some(occasion) = notice.occasion {
        rows.push_str(&detail_row("Occasion", &escape_html(occasion)));
    }

    let mut sections = format!(
        "<table style=\"border-collapse:collapse\">{rows}</table>"
    );

    if let Some(quote) = notice.quote {
        sections.push_str(&format!(
            "<h3 style=\"color:#0b3d66\">Quote</h3><pre style=\"background:#f5f7fa;padding:12px;border-radius:4px\">{}</pre>",
            escape_html(&format_quote(quote))
        ));
    } else {
        sections.push_str(
            "<p><em>No automatic quote: this listing is priced on request.</em></p>",
        );
    }

    if let Some(notes) = notice.notes {
        sections.push_str(&format!(
            "<h3 style=\"color:#0b3d66\">Message from guest</h3><p>{}</p>",
            escape_html(notes)
        ));
    }

    match (notice.approve_url, notice.decline_url) {
        (Some(approve), Some(decline)) => {
            sections.push_str(&format!(
                "<p style=\"margin-top:24px\">\
                 <a href=\"{}\" style=\"background:#1f7a3d;color:#fff;padding:10px 20px;text-decoration:none;border-radius:4px;margin-right:12px\">Approve</a>\
                 <a href=\"{}\" style=\"background:#b3261e;color:#fff;padding:10px 20px;text-decoration:none;border-radius:4px\">Decline</a></p>\
                 <p style=\"color:#52606d;font-size:13px\">Links are valid for a limited time and can be used once.</p>",
                escape_html(approve),
                escape_html(decline),
            ));
        }
        _ => {
            sections.push_str(
                "<p><strong>Action links could not be generated for this inquiry.</strong> \
                 Please handle it manually from the dashboard.</p>",
            );
        }
    }

    let mut footer = String::new();
    if notice.user_agent.is_some() || notice.ip.is_some() {
        footer.push_str("<p style=\"color:#9aa5b1;font-size:12px\">");
        if let Some(ip) = notice.ip {
            footer.push_str(&format!("IP: {} ", escape_html(ip)));
        }
        if let Some(ua) = notice.user_agent {
            footer.push_str(&format!("UA: {}", escape_html(ua)));
        }
        footer.push_str("</p>");
    }
    sections.push_str(&footer);

    let mut text = format!(
        "New inquiry for {}\n\nGuest: {}\nEmail: {}\n",
        notice.villa_name, notice.guest_name, notice.guest_email
    );
    if let Some(phone) = notice.guest_phone {
        text.push_str(&format!("Phone: {phone}\n"));
    }
    text.push_str(&format!(
        "Dates: {}\nParty: {} adults, {} children\n",
        date_range(notice.check_in, notice.check_out),
        notice.adults,
        notice.children
    ));
    if let Some(occasion) = notice.occasion {
        text.push_str(&format!("Occasion: {occasion}\n"));
    }
    if let Some(quote) = notice.quote {
        text.push_str(&format!("\n{}\n", format_quote(quote)));
    } else {
        text.push_str("\nNo automatic quote: this listing is priced on request.\n");
    }
    if let Some(notes) = notice.notes {
        text.push_str(&format!("\nMessage from guest:\n{notes}\n"));
    }
    match (notice.approve_url, notice.decline_url) {
        (Some(approve), Some(decline)) => {
            text.push_str(&format!("\nApprove: {approve}\nDecline: {decline}\n"));
        }
        _ => {
            text.push_str("\nAction links could not be generated; handle manually.\n");
        }
    }

    OutboundContent {
        subject: subject.clone(),
        html: wrap_html(&format!("New inquiry: {}", notice.villa_name), &sections),
        text,
    }
}

/// Immediate acknowledgement so the guest knows the request landed.
pub fn guest_receipt(inquiry: &Inquiry, villa_name: &str) -> OutboundContent {
    let subject = format!("We received your inquiry for {villa_name}");
    let inner = format!(
        "<p>Dear {},</p>\
         <p>Thank you for your inquiry for <strong>{}</strong> from {} \
         for {} guests. The owner reviews every request personally and we will \
         come back to you shortly, usually within 24 hours.</p>\
         <p>No payment is due at this stage.</p>",
        escape_html(&inquiry.guest_name),
        escape_html(villa_name),
        date_range(inquiry.check_in, inquiry.check_out),
        inquiry.party_size,
    );
    let text = format!(
        "Dear {},\n\nThank you for your inquiry for {} from {} for {} guests. \
         The owner reviews every request personally and we will come back to you \
         shortly, usually within 24 hours.\n\nNo payment is due at this stage.\n",
        inquiry.guest_name,
        villa_name,
        date_range(inquiry.check_in, inquiry.check_out),
        inquiry.party_size,
    );
    OutboundContent {
        subject: subject.clone(),
        html: wrap_html(&subject, &inner),
        text,
    }
}

/// Approval message. `payment_url` is absent when checkout session creation
/// failed; the guest is told payment details follow separately.
pub fn guest_approval(
    inquiry: &Inquiry,
    villa_name: &str,
    price: f64,
    currency: &str,
    payment_url: Option<&str>,
) -> OutboundContent {
    let amount = format_money(price, currency);
    let subject = format!("Your stay at {villa_name} is confirmed — payment details inside");
    let mut inner = format!(
        "<p>Dear {},</p>\
         <p>Great news: the owner has approved your stay at <strong>{}</strong> \
         from {}.</p>\
         <p>Total for your stay: <strong>{}</strong></p>",
        escape_html(&inquiry.guest_name),
        escape_html(villa_name),
        date_range(inquiry.check_in, inquiry.check_out),
        amount,
    );
    let mut text = format!(
        "Dear {},\n\nGreat news: the owner has approved your stay at {} from {}.\n\
         Total for your stay: {}\n\n",
        inquiry.guest_name,
        villa_name,
        date_range(inquiry.check_in, inquiry.check_out),
        amount,
    );
    match payment_url {
        Some(url) => {
            inner.push_str(&format!(
                "<p style=\"margin-top:24px\"><a href=\"{}\" \
                 style=\"background:#0b3d66;color:#fff;padding:12px 24px;text-decoration:none;border-radius:4px\">\
                 Complete your booking</a></p>\
                 <p style=\"color:#52606d;font-size:13px\">The payment link is valid for 23 hours. \
                 If it expires, just reply to this email and we will send a new one.</p>",
                escape_html(url)
            ));
            text.push_str(&format!(
                "Complete your booking: {url}\n\nThe payment link is valid for 23 hours. \
                 If it expires, just reply to this email and we will send a new one.\n"
            ));
        }
        None => {
            inner.push_str(
                "<p>We will send your secure payment link in a separate email shortly.</p>",
            );
            text.push_str("We will send your secure payment link in a separate email shortly.\n");
        }
    }
    OutboundContent {
        subject: subject.clone(),
        html: wrap_html(&subject, &inner),
        text,
    }
}

pub fn guest_decline(inquiry: &Inquiry, villa_name: &str) -> OutboundContent {
    let subject = format!("Update on your inquiry for {villa_name}");
    let inner = format!(
        "<p>Dear {},</p>\
         <p>Unfortunately <strong>{}</strong> is not available for {}. \
         We are sorry we could not host you on these dates.</p>\
         <p>Reply to this email if you would like help finding alternative dates \
         or a similar villa.</p>",
        escape_html(&inquiry.guest_name),
        escape_html(villa_name),
        date_range(inquiry.check_in, inquiry.check_out),
    );
    let text = format!(
        "Dear {},\n\nUnfortunately {} is not available for {}. We are sorry we \
         could not host you on these dates.\n\nReply to this email if you would \
         like help finding alternative dates or a similar villa.\n",
        inquiry.guest_name,
        villa_name,
        date_range(inquiry.check_in, inquiry.check_out),
    );
    OutboundContent {
        subject: subject.clone(),
        html: wrap_html(&subject, &inner),
        text,
    }
}

pub fn guest_payment_confirmation(
    inquiry: &Inquiry,
    villa_name: &str,
    total: f64,
    currency: &str,
    booking_reference: &str,
) -> OutboundContent {
    let subject = format!("Booking confirmed: {villa_name}");
    let inner = format!(
        "<p>Dear {},</p>\
         <p>Your payment of <strong>{}</strong> is confirmed. Your stay at \
         <strong>{}</strong> from {} is booked.</p>\
         <p>Booking reference: <strong>{}</strong></p>\
         <p>The owner will contact you before arrival with check-in details.</p>",
        escape_html(&inquiry.guest_name),
        format_money(total, currency),
        escape_html(villa_name),
        date_range(inquiry.check_in, inquiry.check_out),
        escape_html(booking_reference),
    );
    let text = format!(
        "Dear {},\n\nYour payment of {} is confirmed. Your stay at {} from {} is booked.\n\
         Booking reference: {}\n\nThe owner will contact you before arrival with \
         check-in details.\n",
        inquiry.guest_name,
        format_money(total, currency),
        villa_name,
        date_range(inquiry.check_in, inquiry.check_out),
        booking_reference,
    );
    OutboundContent {
        subject: subject.clone(),
        html: wrap_html(&subject, &inner),
        text,
    }
}

/// Settlement summary for the operator and owner after a completed payment.
pub fn owner_payment_notice(
    inquiry: &Inquiry,
    villa_name: &str,
    total: f64,
    platform_fee: f64,
    owner_amount: f64,
    currency: &str,
    booking_reference: &str,
) -> OutboundContent {
    let subject = format!(
        "Payment received: {} — {}",
        villa_name,
        date_range(inquiry.check_in, inquiry.check_out)
    );
    let mut rows = String::new();
    rows.push_str(&detail_row("Guest", &escape_html(&inquiry.guest_name)));
    rows.push_str(&detail_row(
        "Dates",
        &date_range(inquiry.check_in, inquiry.check_out),
    ));
    rows.push_str(&detail_row("Total paid", &format_money(total, currency)));
    rows.push_str(&detail_row(
        "Platform commission",
        &format_money(platform_fee, currency),
    ));
    rows.push_str(&detail_row(
        "Owner payout",
        &format_money(owner_amount, currency),
    ));
    rows.push_str(&detail_row("Reference", &escape_html(booking_reference)));
    let inner = format!("<table style=\"border-collapse:collapse\">{rows}</table>");
    let text = format!(
        "Payment received for {villa_name}\n\nGuest: {}\nDates: {}\nTotal paid: {}\n\
         Platform commission: {}\nOwner payout: {}\nReference: {booking_reference}\n",
        inquiry.guest_name,
        date_range(inquiry.check_in, inquiry.check_out),
        format_money(total, currency),
        format_money(platform_fee, currency),
        format_money(owner_amount, currency),
    );
    OutboundContent {
        subject: subject.clone(),
        html: wrap_html(&subject, &inner),
        text,
    }
}

fn escape_subject(input: &str) -> String {
    input.replace(['\r', '\n'], " ")
}
