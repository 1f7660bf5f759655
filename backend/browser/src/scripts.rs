//! In-page instrumentation script blobs.
//!
//! These are opaque strings submitted to the driver; the core never executes
//! them itself. The init script runs on every document load in a view page.

/// Installed at page creation. Forces a dark background so navigation flashes
/// never reach the matrix, and installs the `__hb` dirtiness tracker: a
/// mutation observer plus resize/scroll listeners feeding a read-and-clear
/// dirty flag.
pub const INIT_SCRIPT: &str = r#"
(() => {
  const darken = () => {
    try {
      if (document.documentElement) document.documentElement.style.background = '#000';
      if (document.body) document.body.style.background = '#000';
    } catch (e) {}
  };
  darken();
  document.addEventListener('DOMContentLoaded', darken);

  window.__hb = { dirty: true, dirtyTs: Date.now(), seq: 0 };
  const mark = () => {
    window.__hb.dirty = true;
    window.__hb.seq += 1;
    window.__hb.dirtyTs = Date.now();
  };

  const observe = () => {
    const root = document.documentElement;
    if (!root) return;
    new MutationObserver(mark).observe(root, {
      subtree: true,
      childList: true,
      attributes: true,
      characterData: true,
    });
  };
  if (document.documentElement) observe();
  else document.addEventListener('DOMContentLoaded', observe);

  window.addEventListener('resize', mark);
  window.addEventListener('scroll', mark, true);
})();
"#;

/// Read-and-clear the dirty flag, returning the prior value. A page without
/// `__hb` (instrumentation not yet run) counts as not dirty.
pub const CONSUME_DIRTY_SCRIPT: &str = r#"
(() => {
  const hb = window.__hb;
  if (!hb) return false;
  const was = !!hb.dirty;
  hb.dirty = false;
  return was;
})()
"#;

/// Two-level nested next-animation-frame wait, run before each screenshot so
/// transient DOM states don't get captured.
pub const PAINT_DEBOUNCE_SCRIPT: &str = r#"
new Promise((resolve) => {
  requestAnimationFrame(() => requestAnimationFrame(() => resolve(true)));
})
"#;

/// Run before each screenshot: hides the text caret and freezes CSS
/// animations and transitions so captures don't pick up blinking or
/// mid-animation states. Idempotent; the style element persists for the
/// lifetime of the document.
pub const SUPPRESS_TRANSIENTS_SCRIPT: &str = r#"
(() => {
  if (!document.getElementById('__hb_capture_style')) {
    const style = document.createElement('style');
    style.id = '__hb_capture_style';
    style.textContent =
      '* { animation: none !important; transition: none !important; caret-color: transparent !important; }';
    (document.head || document.documentElement).appendChild(style);
  }
  return true;
})()
"#;

/// Force the dirty flag after a reload so the next loop iteration captures.
pub const MARK_DIRTY_SCRIPT: &str = r#"
(() => {
  if (window.__hb) {
    window.__hb.dirty = true;
    window.__hb.dirtyTs = Date.now();
  }
  return true;
})()
"#;

/// The init scripts installed on every view page, in order.
pub fn page_init_scripts() -> Vec<String> {
    vec![INIT_SCRIPT.to_string()]
}
