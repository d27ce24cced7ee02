//! Receipt formatting for Tableside POS.
//!
//! Pure functions that turn an order snapshot + restaurant settings into the
//! two printable documents: the kitchen ticket (no prices) and the cash
//! receipt (itemised, with totals and an optional logo). Given the same
//! inputs the output bytes are identical — the documents embed the order's
//! creation time, never the formatting time.

use chrono::DateTime;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::escpos::{EscPosBuilder, PaperWidth};
use crate::models::{Order, OrderItem, RestaurantSettings};

// ---------------------------------------------------------------------------
// Layout constants (42-character thermal line)
// ---------------------------------------------------------------------------

/// Kitchen ticket: item name column. Names longer than this are truncated,
/// shorter ones right-padded — never wrapped, so columns stay aligned.
pub const KITCHEN_NAME_WIDTH: usize = 34;
/// Kitchen ticket: right-aligned quantity column.
pub const KITCHEN_QTY_WIDTH: usize = 8;

/// Cash receipt columns: serial / name / qty / unit price / line amount.
pub const CASH_SR_WIDTH: usize = 3;
pub const CASH_NAME_WIDTH: usize = 17;
pub const CASH_QTY_WIDTH: usize = 4;
pub const CASH_PRICE_WIDTH: usize = 8;
pub const CASH_AMOUNT_WIDTH: usize = 10;

/// Logos taller than this get scaled down to keep receipts compact.
const LOGO_MAX_HEIGHT: u32 = 220;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderWarning {
    pub code: String,
    pub message: String,
}

/// A rendered document: the raw ESC/POS bytes plus non-fatal warnings
/// (e.g. a configured logo that could not be rendered).
#[derive(Debug, Clone)]
pub struct EscPosRender {
    pub bytes: Vec<u8>,
    pub warnings: Vec<RenderWarning>,
}

// ---------------------------------------------------------------------------
// Small formatting helpers
// ---------------------------------------------------------------------------

fn money(value: f64) -> String {
    format!("{value:.2}")
}

/// Truncate to `width` characters, then right-pad with spaces.
fn pad_right(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{truncated:<width$}")
}

/// Truncate to `width` characters, then left-pad with spaces.
fn pad_left(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{truncated:>width$}")
}

/// Tax-rate label without a trailing ".0" for whole percentages.
fn rate_label(rate: f64) -> String {
    if (rate.round() - rate).abs() < f64::EPSILON {
        format!("{rate:.0}%")
    } else {
        format!("{rate:.1}%")
    }
}

/// The order's creation time formatted for the ticket. Falls back to the
/// raw string when the stored timestamp is not RFC 3339.
fn order_timestamp(order: &Order) -> String {
    DateTime::parse_from_rfc3339(&order.created_at)
        .map(|dt| dt.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_else(|_| order.created_at.clone())
}

/// "Table N" for dine-in, otherwise the source channel's display name.
fn location_line(order: &Order, source_name: Option<&str>) -> String {
    match order.table_number {
        Some(table) => format!("Table {table}"),
        None => source_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("Takeaway")
            .to_string(),
    }
}

fn emit_customer(builder: &mut EscPosBuilder, order: &Order) {
    if let Some(customer) = order
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        builder.line_pair("Customer", customer);
    }
}

fn emit_header(builder: &mut EscPosBuilder, settings: &RestaurantSettings, title: &str) {
    builder.center();
    builder
        .bold(true)
        .double_height()
        .text(&settings.name)
        .lf()
        .normal_size()
        .text(title)
        .lf()
        .bold(false);
}

// ---------------------------------------------------------------------------
// Kitchen ticket
// ---------------------------------------------------------------------------

/// Render the kitchen ticket: order reference, location, customer, creation
/// time, and a two-column item table (name / quantity). No prices and no
/// image content.
pub fn render_kitchen_ticket(
    order: &Order,
    items: &[OrderItem],
    settings: &RestaurantSettings,
    source_name: Option<&str>,
) -> EscPosRender {
    let mut builder = EscPosBuilder::new().with_paper(PaperWidth::Mm80);
    builder.init();

    emit_header(&mut builder, settings, "KITCHEN ORDER");
    builder.left().separator();

    builder.line_pair("Order", &format!("#{}", order.short_id()));
    builder.line_pair("For", &location_line(order, source_name));
    emit_customer(&mut builder, order);
    builder.line_pair("Date", &order_timestamp(order));
    builder.separator();

    builder.bold(true);
    builder
        .text(&pad_right("ITEM", KITCHEN_NAME_WIDTH))
        .text(&pad_left("QTY", KITCHEN_QTY_WIDTH))
        .lf();
    builder.bold(false);

    for item in items {
        builder
            .text(&pad_right(&item.name, KITCHEN_NAME_WIDTH))
            .text(&pad_left(&item.quantity.to_string(), KITCHEN_QTY_WIDTH))
            .lf();
        if let Some(note) = item
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
        {
            builder.text(&format!("  * {note}")).lf();
        }
    }

    builder.separator();
    builder.feed(4).cut();

    EscPosRender {
        bytes: builder.build(),
        warnings: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Cash receipt
// ---------------------------------------------------------------------------

/// Render the cash receipt: optional logo, restaurant header and address,
/// bill reference, five-column item table, totals block, payment line when
/// paid, and the thank-you footer.
///
/// `logo_raster` is a pre-rendered ESC/POS raster block (see
/// [`build_logo_raster`]); the formatter itself never performs I/O. When the
/// settings configure a logo but no raster is supplied, the receipt renders
/// without it and a warning is attached.
pub fn render_cash_receipt(
    order: &Order,
    items: &[OrderItem],
    settings: &RestaurantSettings,
    source_name: Option<&str>,
    logo_raster: Option<&[u8]>,
) -> EscPosRender {
    let mut warnings = Vec::new();
    let mut builder = EscPosBuilder::new().with_paper(PaperWidth::Mm80);
    builder.init();

    match logo_raster {
        Some(raster) => {
            builder.center().raw(raster).lf();
        }
        None => {
            if settings
                .logo_url
                .as_deref()
                .map(str::trim)
                .is_some_and(|url| !url.is_empty())
            {
                warnings.push(RenderWarning {
                    code: "logo_unavailable".to_string(),
                    message: "Logo configured but not rendered; using text header".to_string(),
                });
            }
        }
    }

    emit_header(&mut builder, settings, "RECEIPT");
    for line in settings.address.split('\n') {
        let line = line.trim();
        if !line.is_empty() {
            builder.text(line).lf();
        }
    }
    builder.left().separator();

    builder.line_pair("Bill", &format!("#{}", order.short_id()));
    builder.line_pair("For", &location_line(order, source_name));
    emit_customer(&mut builder, order);
    builder.line_pair("Date", &order_timestamp(order));
    builder.separator();

    builder.bold(true);
    builder
        .text(&pad_right("No", CASH_SR_WIDTH))
        .text(&pad_right("Item", CASH_NAME_WIDTH))
        .text(&pad_left("Qty", CASH_QTY_WIDTH))
        .text(&pad_left("Price", CASH_PRICE_WIDTH))
        .text(&pad_left("Amount", CASH_AMOUNT_WIDTH))
        .lf();
    builder.bold(false);

    for (index, item) in items.iter().enumerate() {
        builder
            .text(&pad_right(&(index + 1).to_string(), CASH_SR_WIDTH))
            .text(&pad_right(&item.name, CASH_NAME_WIDTH))
            .text(&pad_left(&item.quantity.to_string(), CASH_QTY_WIDTH))
            .text(&pad_left(&money(item.price), CASH_PRICE_WIDTH))
            .text(&pad_left(&money(item.line_amount()), CASH_AMOUNT_WIDTH))
            .lf();
    }

    builder.separator();

    // The displayed tax is always total − subtotal, never recomputed from
    // the rate, so the receipt cannot disagree with the stored totals.
    let display_tax = order.total - order.subtotal;
    let currency = settings.currency.as_str();
    builder.line_pair("Subtotal", &format!("{currency}{}", money(order.subtotal)));
    builder.line_pair(
        &format!("Tax ({})", rate_label(settings.tax_rate)),
        &format!("{currency}{}", money(display_tax)),
    );
    builder.bold(true).double_height();
    builder.line_pair("TOTAL", &format!("{currency}{}", money(order.total)));
    builder.normal_size().bold(false);

    if order.paid {
        if let Some(method) = order
            .payment_method
            .as_deref()
            .map(str::trim)
            .filter(|method| !method.is_empty())
        {
            builder.separator();
            builder.line_pair("Paid by", method);
        }
    }

    builder.separator();
    builder.center().text("Thank you, visit again!").lf().left();
    builder.feed(4).cut();

    EscPosRender {
        bytes: builder.build(),
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Logo rasterization
// ---------------------------------------------------------------------------

/// Decode a logo image and pack it into an ESC/POS raster block sized for
/// the paper. Pure: bytes in, bytes out.
pub fn build_logo_raster(image_bytes: &[u8], paper: PaperWidth) -> Result<Vec<u8>, String> {
    let decoded = image::load_from_memory(image_bytes).map_err(|e| format!("logo decode: {e}"))?;
    let gray = decoded.to_luma8();
    let (src_w, src_h) = gray.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err("logo image has invalid dimensions".to_string());
    }

    let max_width = paper.dots().max(8);
    let mut target_w = src_w.min(max_width).max(1);
    let mut target_h = ((src_h as f32 * (target_w as f32 / src_w as f32)).round() as u32).max(1);
    if target_h > LOGO_MAX_HEIGHT {
        target_h = LOGO_MAX_HEIGHT;
        target_w = ((src_w as f32 * (target_h as f32 / src_h as f32)).round() as u32).max(1);
    }

    let resized = if target_w != src_w || target_h != src_h {
        image::imageops::resize(&gray, target_w, target_h, FilterType::Triangle)
    } else {
        gray
    };

    let width = resized.width();
    let height = resized.height();
    let width_bytes = width.div_ceil(8);
    let mut packed = Vec::with_capacity((width_bytes * height) as usize);
    for y in 0..height {
        for xb in 0..width_bytes {
            let mut byte = 0u8;
            for bit in 0..8u32 {
                let x = xb * 8 + bit;
                if x >= width {
                    continue;
                }
                let luma = resized.get_pixel(x, y).0[0];
                if luma < 160 {
                    byte |= 0x80 >> bit;
                }
            }
            packed.push(byte);
        }
    }

    let mut builder = EscPosBuilder::new().with_paper(paper);
    builder.raster_image(width_bytes as u16, height as u16, &packed);
    Ok(builder.build())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    fn settings() -> RestaurantSettings {
        RestaurantSettings {
            id: "rs-1".into(),
            name: "Casa Pepe".into(),
            address: "12 Harbour Road\n Old Town ".into(),
            logo_url: None,
            currency: "$".into(),
            tax_rate: 10.0,
            business_hours: None,
            table_count: 12,
            kitchen_printing_enabled: true,
            kitchen_printer: Some("kitchen".into()),
            cash_printer: Some("cash".into()),
            updated_at: String::new(),
        }
    }

    fn order() -> Order {
        Order {
            id: "a1b2c3d4-e5f6-7890-abcd-ef0123456789".into(),
            table_number: Some(5),
            order_source_id: None,
            customer_name: Some("Maria".into()),
            subtotal: 227.27,
            tax: 22.73,
            total: 250.0,
            status: OrderStatus::Pending,
            paid: false,
            payment_method: None,
            printed_at: None,
            created_at: "2026-02-21T10:30:00+00:00".into(),
            updated_at: "2026-02-21T10:30:00+00:00".into(),
        }
    }

    fn items() -> Vec<OrderItem> {
        vec![
            OrderItem {
                id: "it-1".into(),
                order_id: "a1b2c3d4".into(),
                menu_item_id: Some("mi-1".into()),
                name: "Grilled Halloumi".into(),
                price: 100.0,
                quantity: 2,
                notes: Some("no lemon".into()),
                created_at: String::new(),
            },
            OrderItem {
                id: "it-2".into(),
                order_id: "a1b2c3d4".into(),
                menu_item_id: None,
                name: "Lemonade".into(),
                price: 50.0,
                quantity: 1,
                notes: None,
                created_at: String::new(),
            },
        ]
    }

    /// Extract the printable-text payload of a render, dropping ESC/GS
    /// command sequences so assertions see what the paper would show.
    fn printed_text(bytes: &[u8]) -> String {
        let mut out = String::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                0x1B => {
                    // ESC @ is two bytes; every other ESC command here is three.
                    i += if bytes.get(i + 1) == Some(&0x40) { 2 } else { 3 };
                }
                0x1D => {
                    match bytes.get(i + 1) {
                        // GS V A n — cut
                        Some(0x56) => i += 4,
                        // GS v 0 m xL xH yL yH + data
                        Some(0x76) => {
                            let wb = bytes[i + 4] as usize | ((bytes[i + 5] as usize) << 8);
                            let h = bytes[i + 6] as usize | ((bytes[i + 7] as usize) << 8);
                            i += 8 + wb * h;
                        }
                        // GS ! n — text size
                        _ => i += 3,
                    }
                }
                0x0A => {
                    out.push('\n');
                    i += 1;
                }
                b => {
                    out.push(b as char);
                    i += 1;
                }
            }
        }
        out
    }

    #[test]
    fn kitchen_item_lines_are_exactly_42_chars() {
        let long_name = "Slow-roasted lamb shoulder with rosemary potatoes";
        let mut rows = items();
        rows[0].name = long_name.into();
        let out = render_kitchen_ticket(&order(), &rows, &settings(), None);
        let text = printed_text(&out.bytes);

        let line = text
            .lines()
            .find(|l| l.starts_with("Slow-roasted"))
            .expect("item line present");
        assert_eq!(line.chars().count(), 42);
        // Truncated at the name column boundary, quantity right-aligned.
        assert_eq!(&line[..KITCHEN_NAME_WIDTH], &long_name[..KITCHEN_NAME_WIDTH]);
        assert!(line.ends_with("       2"));

        let short_line = text
            .lines()
            .find(|l| l.starts_with("Lemonade"))
            .expect("short item line present");
        assert_eq!(short_line.chars().count(), 42);
    }

    #[test]
    fn kitchen_ticket_has_no_prices() {
        let out = render_kitchen_ticket(&order(), &items(), &settings(), None);
        let text = printed_text(&out.bytes);
        assert!(!text.contains("100.00"));
        assert!(!text.contains("250.00"));
        assert!(text.contains("KITCHEN ORDER"));
        assert!(text.contains("#A1B2C3D4"));
        assert!(text.contains("Table 5"));
        assert!(text.contains("Maria"));
        assert!(text.contains("* no lemon"));
    }

    #[test]
    fn cash_receipt_amounts_and_totals() {
        let out = render_cash_receipt(&order(), &items(), &settings(), None, None);
        let text = printed_text(&out.bytes);
        // price × quantity per line
        assert!(text.contains("200.00"));
        assert!(text.contains("50.00"));
        assert!(text.contains("Subtotal"));
        assert!(text.contains("$227.27"));
        // Displayed tax is total − subtotal, not the stored tax column.
        assert!(text.contains("Tax (10%)"));
        assert!(text.contains("$22.73"));
        assert!(text.contains("TOTAL"));
        assert!(text.contains("$250.00"));
        assert!(text.contains("Thank you, visit again!"));
        // Address lines split and trimmed.
        assert!(text.contains("12 Harbour Road\n"));
        assert!(text.contains("Old Town\n"));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn cash_receipt_displays_tax_as_total_minus_subtotal() {
        let mut o = order();
        // Stored tax disagrees with the totals on purpose.
        o.subtotal = 90.0;
        o.tax = 55.0;
        o.total = 100.0;
        let out = render_cash_receipt(&o, &items(), &settings(), None, None);
        let text = printed_text(&out.bytes);
        assert!(text.contains("$10.00"));
        assert!(!text.contains("$55.00"));
    }

    #[test]
    fn cash_receipt_shows_payment_method_only_when_paid() {
        let mut o = order();
        let out = render_cash_receipt(&o, &items(), &settings(), None, None);
        assert!(!printed_text(&out.bytes).contains("Paid by"));

        o.paid = true;
        o.payment_method = Some("card".into());
        let out = render_cash_receipt(&o, &items(), &settings(), None, None);
        let text = printed_text(&out.bytes);
        assert!(text.contains("Paid by"));
        assert!(text.contains("card"));
    }

    #[test]
    fn source_order_uses_source_name_for_location() {
        let mut o = order();
        o.table_number = None;
        o.order_source_id = Some("src-1".into());
        let out = render_kitchen_ticket(&o, &items(), &settings(), Some("Wolt"));
        let text = printed_text(&out.bytes);
        assert!(text.contains("Wolt"));
        assert!(!text.contains("Table"));
    }

    #[test]
    fn logo_warning_when_configured_but_missing() {
        let mut cfg = settings();
        cfg.logo_url = Some("https://cdn.example/logo.png".into());
        let out = render_cash_receipt(&order(), &items(), &cfg, None, None);
        assert!(out.warnings.iter().any(|w| w.code == "logo_unavailable"));

        // With a raster supplied, no warning and the block is embedded.
        let raster = {
            let mut b = EscPosBuilder::new();
            b.raster_image(1, 1, &[0x80]);
            b.build()
        };
        let out = render_cash_receipt(&order(), &items(), &cfg, None, Some(&raster));
        assert!(out.warnings.is_empty());
        assert!(out.bytes.windows(2).any(|w| w == [0x1D, 0x76]));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render_cash_receipt(&order(), &items(), &settings(), None, None);
        let b = render_cash_receipt(&order(), &items(), &settings(), None, None);
        assert_eq!(a.bytes, b.bytes);
        let k1 = render_kitchen_ticket(&order(), &items(), &settings(), None);
        let k2 = render_kitchen_ticket(&order(), &items(), &settings(), None);
        assert_eq!(k1.bytes, k2.bytes);
    }

    #[test]
    fn both_documents_end_with_cut() {
        for bytes in [
            render_kitchen_ticket(&order(), &items(), &settings(), None).bytes,
            render_cash_receipt(&order(), &items(), &settings(), None, None).bytes,
        ] {
            assert_eq!(&bytes[bytes.len() - 4..], &[0x1D, 0x56, 0x41, 0x10]);
        }
    }

    #[test]
    fn logo_raster_packs_rows_to_byte_stride() {
        let logo =
            image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(10, 4, image::Luma([0])));
        let mut encoded = Vec::new();
        logo.write_to(
            &mut std::io::Cursor::new(&mut encoded),
            image::ImageFormat::Png,
        )
        .expect("encode png");

        let raster = build_logo_raster(&encoded, PaperWidth::Mm80).expect("raster");
        // GS v 0 header: 10 dots → 2 bytes per row, 4 rows.
        assert_eq!(&raster[..8], &[0x1D, 0x76, 0x30, 0x00, 2, 0, 4, 0]);
        assert_eq!(raster.len(), 8 + 2 * 4);
        // All-black source pixels set the bits.
        assert_eq!(raster[8], 0xFF);
    }
}
