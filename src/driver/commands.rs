//! Page-command scripts sent through the driver seam.
//!
//! Each constant is one self-contained command: the core evaluates it
//! and interprets the boolean/string result, never manipulating a live
//! document itself.

/// Known blocking markers, checked against visible text in both the
/// locales the target serves, plus the challenge iframe itself.
pub const DETECT_BLOCKING: &str = r#"
(() => {
  const text = document.body ? document.body.innerText.toLowerCase() : '';
  return text.includes('no soy un robot') ||
    text.includes("i'm not a robot") ||
    text.includes('unusual traffic') ||
    text.includes('tráfico inusual') ||
    document.querySelector('iframe[src*="recaptcha"]') !== null;
})()
"#;

/// Declared site key on the page, or null.
pub const FIND_SITE_KEY: &str = r#"
(() => {
  const el = document.querySelector('[data-sitekey]');
  if (el) return el.getAttribute('data-sitekey');
  const g = document.querySelector('.g-recaptcha');
  if (g) return g.getAttribute('data-sitekey');
  return null;
})()
"#;

/// URLs of all embedded frames, for site-key extraction when no
/// declared key exists.
pub const FRAME_URLS: &str = r#"
Array.from(document.querySelectorAll('iframe')).map(f => f.src || '')
"#;

/// Ensure the expected response surface exists and fill it with the
/// solution token.
pub fn inject_token(token: &str) -> String {
    // serde_json string-escapes the token for safe embedding.
    let quoted = serde_json::to_string(token).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"
(() => {{
  const token = {quoted};
  let textarea = document.getElementById('g-recaptcha-response');
  if (!textarea) {{
    textarea = document.createElement('textarea');
    textarea.id = 'g-recaptcha-response';
    textarea.name = 'g-recaptcha-response';
    textarea.className = 'g-recaptcha-response';
    textarea.style.display = 'none';
    document.body.appendChild(textarea);
  }}
  textarea.value = token;
  textarea.innerHTML = token;
  return true;
}})()
"#
    )
}

/// Minimal human-like interaction: pointer movement events and a small
/// scroll, so the server-side session sees activity before the token
/// is validated.
pub const SIMULATE_INTERACTION: &str = r#"
(() => {
  const move = (x, y) => document.dispatchEvent(
    new MouseEvent('mousemove', { clientX: x, clientY: y, bubbles: true }));
  move(100, 100);
  move(300, 400);
  window.scrollBy(0, 100);
  return true;
})()
"#;

/// Best-effort clicks on the challenge checkbox and any submit button.
pub const CLICK_CHALLENGE_CONTROLS: &str = r#"
(() => {
  let clicked = false;
  const box = document.querySelector('.recaptcha-checkbox-border');
  if (box) { box.click(); clicked = true; }
  const submit = document.querySelector('button[type="submit"]');
  if (submit) { submit.click(); clicked = true; }
  return clicked;
})()
"#;

/// Visual cleanup so a snapshot stays presentable: remove residual
/// challenge DOM, hide very-high-stacking-order overlays, replace
/// blocked image containers with placeholders. Returns the number of
/// elements touched.
pub const CLEANUP_OVERLAYS: &str = r#"
(() => {
  let touched = 0;
  for (const el of document.querySelectorAll(
      'iframe[src*="recaptcha"], .g-recaptcha, #recaptcha, [id*="captcha"]')) {
    el.remove();
    touched++;
  }
  for (const el of document.querySelectorAll('body *')) {
    const z = parseInt(window.getComputedStyle(el).zIndex, 10);
    if (!isNaN(z) && z >= 10000) {
      el.style.display = 'none';
      touched++;
    }
  }
  for (const img of document.querySelectorAll('img')) {
    if (img.complete && img.naturalWidth === 0) {
      const ph = document.createElement('div');
      ph.style.cssText =
        'width:' + (img.width || 100) + 'px;height:' + (img.height || 100) +
        'px;background:#eee;display:inline-block;';
      img.replaceWith(ph);
      touched++;
    }
  }
  return touched;
})()
"#;

/// True once every visible image has finished loading.
pub const IMAGES_COMPLETE: &str = r#"
Array.from(document.querySelectorAll('img')).every(img => img.complete)
"#;
