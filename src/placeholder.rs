// Deterministic placeholder images, used when there is no credential or the
// upstream call fails. Output depends only on the inputs.

use base64::Engine;

const DATA_URI_PREFIX: &str = "data:image/svg+xml;base64,";
const FALLBACK_FOLD_SEED: i64 = 7;
const FALLBACK_FOLD_TEXT: &str = "mock";

/// Which path produced the placeholder. Only changes the caption text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// No credential was supplied.
    Mock,
    /// Upstream generation failed.
    Fallback,
}

impl PlaceholderKind {
    fn caption(self) -> &'static str {
        match self {
            Self::Mock => "Mock Image",
            Self::Fallback => "API Error Fallback",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Self::Mock => "Prompt",
            Self::Fallback => "Original Prompt",
        }
    }
}

pub fn synthesize(
    kind: PlaceholderKind,
    prompt: &str,
    width: u32,
    height: u32,
    seed: i64,
    style_weight: f64,
) -> String {
    let svg = render_svg(kind, prompt, width, height, seed, style_weight);
    format!("{}{}", DATA_URI_PREFIX, base64::engine::general_purpose::STANDARD.encode(svg.as_bytes()))
}

/// Base hue in `0..360`, folded over the leading UTF-16 unit of each character.
pub fn base_hue(prompt: &str, seed: i64) -> u32 {
    let start = if seed == 0 { FALLBACK_FOLD_SEED } else { seed };
    let text = if prompt.is_empty() { FALLBACK_FOLD_TEXT } else { prompt };
    let sum = text
        .chars()
        .map(|c| c.encode_utf16(&mut [0; 2])[0])
        .fold(start, |acc, unit| acc.wrapping_add(i64::from(unit)));
    (sum.unsigned_abs() % 360) as u32
}

/// Strips characters that would break out of the SVG markup.
pub fn sanitize_prompt(prompt: &str) -> String {
    prompt.chars().filter(|c| !matches!(c, '<' | '>' | '"' | '&')).collect()
}

/// Decodes a placeholder data URI back into SVG text.
#[cfg(test)]
pub fn decode_data_uri(uri: &str) -> Option<String> {
    let encoded = uri.strip_prefix(DATA_URI_PREFIX)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

pub fn is_placeholder(location: &str) -> bool { location.starts_with(DATA_URI_PREFIX) }

fn render_svg(kind: PlaceholderKind, prompt: &str, width: u32, height: u32, seed: i64, style_weight: f64) -> String {
    let hue = base_hue(prompt, seed);
    let grad1 = format!("hsl({}, 70%, 18%)", hue);
    let grad2 = format!("hsl({}, 70%, 28%)", (hue + 40) % 360);
    let accent = format!("hsl({}, 80%, 60%)", (hue + 80) % 360);
    let text = sanitize_prompt(prompt);

    let w = f64::from(width);
    let h = f64::from(height);
    let short = w.min(h);
    let text_width = width.saturating_sub(48);
    let text_height = height.saturating_sub(80);

    format!(r#"
  <svg xmlns='http://www.w3.org/2000/svg' width='{width}' height='{height}'>
    <defs>
      <linearGradient id='g' x1='0' y1='0' x2='1' y2='1'>
        <stop offset='0%' stop-color='{grad1}'/>
        <stop offset='100%' stop-color='{grad2}'/>
      </linearGradient>
      <filter id='grain'>
        <feTurbulence type='fractalNoise' baseFrequency='0.8' numOctaves='2' stitchTiles='stitch'/>
        <feColorMatrix type='saturate' values='0'/>
        <feBlend mode='soft-light' in2='SourceGraphic'/>
      </filter>
    </defs>
    <rect width='100%' height='100%' fill='url(#g)'/>
    <g filter='url(#grain)'>
      <circle cx='{cx}' cy='{cy}' r='{r}' fill='{accent}' opacity='0.4'/>
      <rect x='{rx}' y='{ry}' width='{rw}' height='{rh}' rx='{corner}' fill='{accent}' opacity='0.15'/>
    </g>
    <text x='24' y='36' font-family='ui-monospace, SFMono-Regular, Menlo, monospace' font-size='14' fill='white' opacity='0.75'>
      ECF • {caption} • seed:{seed} • sw:{sw:.2}
    </text>
    <foreignObject x='24' y='52' width='{text_width}' height='{text_height}'>
      <div xmlns='http://www.w3.org/1999/xhtml' style='font-family: ui-sans-serif, system-ui; color:white; opacity:.9; line-height:1.4; font-size:16px; overflow:hidden;'>
        <div style='font-weight:700;margin-bottom:6px;'>{heading}</div>
        <div style='opacity:.95; word-break:break-word;'>{text}</div>
      </div>
    </foreignObject>
  </svg>"#,
        cx = w * 0.15,
        cy = h * 0.2,
        r = short * 0.12,
        rx = w * 0.55,
        ry = h * 0.6,
        rw = w * 0.35,
        rh = h * 0.3,
        corner = short * 0.04,
        caption = kind.caption(),
        heading = kind.heading(),
        sw = style_weight,
    )
}
