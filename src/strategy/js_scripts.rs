//! JavaScript evaluated inside pages during navigation.
//!
//! Everything here returns JSON-serializable values so results come back
//! through `evaluate().into_value()`.

/// Computed visibility of `<body>`: display, visibility and opacity checks.
pub const BODY_VISIBILITY_SCRIPT: &str = r"
(() => {
    const body = document.body;
    if (!body) { return false; }
    const style = window.getComputedStyle(body);
    return style.display !== 'none'
        && style.visibility !== 'hidden'
        && parseFloat(style.opacity || '1') > 0;
})()
";

/// Whether every image on the page finished loading.
pub const IMAGES_COMPLETE_SCRIPT: &str = r"
(() => Array.from(document.images).every(img => img.complete))()
";

/// Content extent for viewport adjustment.
pub const CONTENT_SIZE_SCRIPT: &str = r"
(() => ({
    width: Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0),
    height: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)
}))()
";

/// Current scroll position and total height, re-read every scan step so
/// lazy-loaded content extends the run.
pub const SCROLL_STATE_SCRIPT: &str = r"
(() => ({
    position: window.scrollY + window.innerHeight,
    total: document.documentElement.scrollHeight
}))()
";

/// Write intrinsic dimensions into width/height attributes so downstream
/// image scoring sees real sizes instead of CSS-era zeros.
pub const UPDATE_IMAGE_DIMENSIONS_SCRIPT: &str = r"
(() => {
    let updated = 0;
    for (const img of document.images) {
        if (img.naturalWidth > 0 && !img.getAttribute('width')) {
            img.setAttribute('width', String(img.naturalWidth));
            img.setAttribute('height', String(img.naturalHeight));
            updated += 1;
        }
    }
    return updated;
})()
";

/// Inline same-origin iframe bodies as divs; cross-origin frames are
/// counted as skipped. Returns {inlined, skipped}.
pub const INLINE_IFRAMES_SCRIPT: &str = r#"
(() => {
    let inlined = 0;
    let skipped = 0;
    const iframes = Array.from(document.querySelectorAll('iframe'));
    iframes.forEach((iframe, i) => {
        try {
            const doc = iframe.contentDocument;
            if (!doc || !doc.body) { skipped += 1; return; }
            const div = document.createElement('div');
            div.className = 'extracted-iframe-content-' + i;
            div.innerHTML = doc.body.innerHTML;
            iframe.replaceWith(div);
            inlined += 1;
        } catch (e) {
            skipped += 1;
        }
    });
    return { inlined, skipped };
})()
"#;

/// Click known close buttons, then delete fixed/high-z-index modal-like
/// nodes and the empty shells they leave behind. Returns removed count.
pub const REMOVE_OVERLAYS_SCRIPT: &str = r#"
(() => {
    let removed = 0;
    const closeSelectors = [
        '[aria-label*="close" i]', '.close', '.close-button', '.dismiss',
        '.modal-close', '.popup-close', '[data-dismiss]'
    ];
    for (const sel of closeSelectors) {
        document.querySelectorAll(sel).forEach(el => {
            try { el.click(); } catch (e) {}
        });
    }
    const candidates = Array.from(document.querySelectorAll('body *'));
    for (const el of candidates) {
        const style = window.getComputedStyle(el);
        const z = parseInt(style.zIndex, 10);
        const floating = style.position === 'fixed' || style.position === 'sticky';
        const modalLike = /modal|overlay|popup|backdrop|cookie|consent|newsletter/i
            .test(el.className + ' ' + el.id);
        if ((floating && z > 100) || (modalLike && floating)) {
            el.remove();
            removed += 1;
        }
    }
    document.querySelectorAll('div, section').forEach(el => {
        if (!el.hasChildNodes() && !el.textContent.trim()) {
            el.remove();
        }
    });
    document.body.style.overflow = 'auto';
    return removed;
})()
"#;

/// Small human-shaped gesture: mouse move, click near the origin, one
/// ArrowDown. Dispatched as synthetic events.
pub const SIMULATE_USER_SCRIPT: &str = r"
(() => {
    const move = new MouseEvent('mousemove', { clientX: 120, clientY: 140, bubbles: true });
    document.dispatchEvent(move);
    const click = new MouseEvent('click', { clientX: 120, clientY: 140, bubbles: true });
    document.body.dispatchEvent(click);
    const key = new KeyboardEvent('keydown', { key: 'ArrowDown', bubbles: true });
    document.body.dispatchEvent(key);
    return true;
})()
";

/// document.readyState, for wait-until polling.
pub const READY_STATE_SCRIPT: &str = "document.readyState";
