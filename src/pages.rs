//! HTML for people using a browser. The JSON API lives under `/pastes`.

use html_escape::encode_text;

use crate::paste_repo::ViewedPaste;

const STYLE: &str = r"
body { font-family: system-ui, sans-serif; background: #f9fafb; color: #111827; margin: 0; padding: 3rem 1rem; }
main { max-width: 48rem; margin: 0 auto; background: #fff; border: 1px solid #e5e7eb; border-radius: 8px; padding: 1.5rem; }
label { display: block; font-size: .875rem; margin: 1rem 0 .25rem; }
textarea, input { width: 100%; box-sizing: border-box; padding: .5rem; border: 1px solid #d1d5db; border-radius: 6px; }
textarea { height: 10rem; font-family: monospace; }
button { margin-top: 1rem; padding: .5rem 1rem; background: #2563eb; color: #fff; border: 0; border-radius: 6px; }
pre { background: #111827; color: #f3f4f6; padding: 1rem; border-radius: 6px; white-space: pre-wrap; word-break: break-word; }
.meta { color: #6b7280; font-size: .875rem; }
.error { color: #b91c1c; }
";

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en"><head><meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title><style>{STYLE}</style></head>
<body><main>{body}</main></body></html>"#
    )
}

#[must_use]
pub fn index_page() -> String {
    layout(
        "Pastebin Lite",
        r#"<h1>Pastebin Lite</h1>
<p class="meta">Create a text paste and share a link to view it.</p>
<form id="create">
  <label for="content">Content</label>
  <textarea id="content" required placeholder="Enter your text here..."></textarea>
  <label for="ttl">Expire after (seconds, optional)</label>
  <input id="ttl" type="number" min="1" step="1">
  <label for="views">Maximum views (optional)</label>
  <input id="views" type="number" min="1" step="1">
  <button type="submit">Create paste</button>
</form>
<p id="result"></p>
<script>
document.getElementById("create").addEventListener("submit", async (event) => {
  event.preventDefault();
  const result = document.getElementById("result");
  const payload = { content: document.getElementById("content").value };
  const ttl = parseInt(document.getElementById("ttl").value, 10);
  const views = parseInt(document.getElementById("views").value, 10);
  if (ttl > 0) payload.ttl_seconds = ttl;
  if (views > 0) payload.max_views = views;
  result.className = "";
  result.textContent = "";
  try {
    const res = await fetch("/pastes", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify(payload),
    });
    const data = await res.json();
    if (!res.ok) throw new Error((data.errors || [data.error]).join(", "));
    const link = document.createElement("a");
    link.href = data.url;
    link.textContent = data.url;
    result.append("Your paste: ", link);
    event.target.reset();
  } catch (err) {
    result.className = "error";
    result.textContent = err.message;
  }
});
</script>"#,
    )
}

/// The countdown runs on the browser's clock; the server already decided the paste is live.
#[must_use]
pub fn paste_page(paste: &ViewedPaste) -> String {
    let mut meta = Vec::new();
    if let Some(remaining_views) = paste.remaining_views {
        meta.push(format!("Views left: {remaining_views}"));
    }
    if paste.expires_at.is_some() {
        meta.push(r#"Expires in: <span id="countdown"></span>"#.to_owned());
    }
    if meta.is_empty() {
        meta.push("No expiration".to_owned());
    }

    let countdown = paste.expires_at.map_or_else(String::new, |expires_at| {
        format!(
            r#"<script>
const expiresAt = {expires_at};
const countdown = document.getElementById("countdown");
function tick() {{
  const now = Date.now();
  if (now >= expiresAt) {{
    document.querySelector("main").innerHTML =
      '<h1>Paste expired</h1><p class="meta">This paste has reached its time limit.</p><a href="/">Create new paste</a>';
    clearInterval(timer);
    return;
  }}
  const left = Math.floor((expiresAt - now) / 1000);
  const h = Math.floor(left / 3600), m = Math.floor((left % 3600) / 60), s = left % 60;
  countdown.textContent = h > 0 ? `${{h}}h ${{m}}m ${{s}}s` : m > 0 ? `${{m}}m ${{s}}s` : `${{s}}s`;
}}
const timer = setInterval(tick, 1000);
tick();
</script>"#
        )
    });

    layout(
        "Pastebin Lite",
        &format!(
            r#"<h1>Pastebin Lite</h1>
<p class="meta">{meta}</p>
<pre>{content}</pre>
<a href="/">&larr; Create new paste</a>{countdown}"#,
            meta = meta.join(" &middot; "),
            content = encode_text(&paste.content),
        ),
    )
}

#[must_use]
pub fn not_found_page() -> String {
    layout(
        "Not found",
        r#"<h1>Paste unavailable</h1>
<p class="meta">This paste does not exist, has expired, or has run out of views.</p>
<a href="/">Create new paste</a>"#,
    )
}

#[must_use]
pub fn error_page(error_id: &str) -> String {
    layout(
        "Error",
        &format!(
            r#"<h1>Something went wrong</h1>
<p class="meta">Error ID: {}</p>
<a href="/">Back</a>"#,
            encode_text(error_id)
        ),
    )
}
