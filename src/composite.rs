use crate::foundation::core::Color;

/// Source-over for straight-alpha RGBA8 pixels.
///
/// Fully transparent sources leave `dst` untouched and fully opaque sources replace it,
/// so layers that only paint part of their surface never disturb what lies beneath.
pub fn over(dst: Color, src: Color) -> Color {
    let [sr, sg, sb, sa] = src.0;
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    let [dr, dg, db, da] = dst.0;
    let inv = 255u16 - u16::from(sa);
    let dst_weight = mul_div255(u16::from(da), inv);
    let out_a = u16::from(sa) + u16::from(dst_weight);
    if out_a == 0 {
        return image::Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| -> u8 {
        let num = u32::from(s) * u32::from(sa) + u32::from(d) * u32::from(dst_weight);
        ((num + u32::from(out_a) / 2) / u32::from(out_a)).min(255) as u8
    };

    image::Rgba([
        blend(sr, dr),
        blend(sg, dg),
        blend(sb, db),
        out_a.min(255) as u8,
    ])
}

/// Scale a pixel's color channels by `brightness` percent (0..=100), keeping alpha.
pub fn dim(c: Color, brightness: u8) -> Color {
    let pct = u16::from(brightness.min(100));
    let scale = |v: u8| -> u8 { ((u16::from(v) * pct + 50) / 100) as u8 };
    let [r, g, b, a] = c.0;
    image::Rgba([scale(r), scale(g), scale(b), a])
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
