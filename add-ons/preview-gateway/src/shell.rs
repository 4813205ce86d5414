//! Host shell page: editor, sandboxed preview frame and the message bridge.
//!
//! The frame never gets `allow-same-origin`, so the generated markup inside it
//! runs in an opaque origin and can only reach the host through `postMessage`.
//! The bridge forwards messages whose source is the frame's window and nothing else.

use preview_core::{escape_html, SandboxPolicy};

/// Starter document loaded into an empty workspace.
pub(crate) const STARTER_DOCUMENT: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Corner Bistro</title>
<style>
body { font-family: Georgia, serif; margin: 0; color: #2b2118; }
header { display: flex; gap: 1rem; padding: 1rem 2rem; background: #f4ede4; }
header a { color: inherit; }
main { padding: 2rem; }
button { background: #8a3b12; color: #fff; border: 0; padding: .6rem 1.2rem; border-radius: 4px; }
</style>
</head>
<body>
<header>
<nav><a href="/">Home</a> <a href="/menu">Menu</a> <a href="/about-us">About Us</a> <a href="/contact">Contact</a></nav>
</header>
<main>
<h1>Corner Bistro</h1>
<p>Seasonal plates, natural wine, open late.</p>
<button>Book a Table</button>
<button>View Cart</button>
<form>
<label>Email <input type="email" name="email"></label>
<button type="submit">Subscribe</button>
</form>
</main>
</body>
</html>
"#;

const SHELL_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{APP_NAME}}</title>
<style>
body { margin: 0; display: grid; grid-template-columns: 38% 1fr; height: 100vh; font-family: system-ui, sans-serif; }
aside { display: flex; flex-direction: column; border-right: 1px solid #ddd; }
aside header { display: flex; gap: .5rem; align-items: center; padding: .5rem; border-bottom: 1px solid #ddd; }
#source { flex: 1; font-family: ui-monospace, monospace; font-size: 13px; border: 0; padding: .75rem; resize: none; }
#selection { padding: .5rem; border-top: 1px solid #ddd; font-size: 12px; }
#selection[hidden] { display: none; }
iframe { width: 100%; height: 100%; border: 0; }
#toasts { position: fixed; right: 1rem; bottom: 1rem; display: flex; flex-direction: column; gap: .5rem; }
.toast { background: #222; color: #fff; padding: .5rem .9rem; border-radius: 4px; font-size: 13px; }
</style>
</head>
<body>
<aside>
<header>
<strong>{{APP_NAME}}</strong>
<label><input type="checkbox" id="edit-mode"> Edit mode</label>
<button id="clear-pages" type="button">Clear pages</button>
</header>
<textarea id="source" spellcheck="false"></textarea>
<div id="selection" hidden>
<div id="selection-label"></div>
<input id="selection-text" placeholder="Text">
<button id="selection-apply" type="button">Apply</button>
</div>
</aside>
<iframe id="preview" sandbox="{{SANDBOX}}" title="Preview"></iframe>
<div id="toasts"></div>
<script>
(function(){
  var frame = document.getElementById('preview');
  var source = document.getElementById('source');
  var selected = null;
  var history = [];
  var goingBack = false;

  function api(method, url, body){
    return fetch(url, {
      method: method,
      headers: {'Content-Type': 'application/json'},
      body: body === undefined ? undefined : JSON.stringify(body)
    });
  }
  function toast(text){
    var el = document.createElement('div');
    el.className = 'toast';
    el.textContent = text;
    document.getElementById('toasts').appendChild(el);
    setTimeout(function(){ el.remove(); }, 4000);
  }

  var events = new EventSource('/v1/preview/events');
  events.addEventListener('document', function(e){
    frame.srcdoc = JSON.parse(e.data).document;
  });
  events.addEventListener('message', function(e){
    var msg = JSON.parse(e.data).message;
    if (frame.contentWindow) { frame.contentWindow.postMessage(msg, '*'); }
  });
  events.addEventListener('source', function(e){
    var doc = JSON.parse(e.data);
    if (document.activeElement !== source && source.value !== doc.content) { source.value = doc.content; }
  });
  events.addEventListener('effect', function(e){
    var fx = JSON.parse(e.data);
    if (fx.kind === 'open_external') {
      if (/^https?:\/\/[^\/\s]/i.test(fx.url)) { window.open(fx.url, '_blank', 'noopener'); }
    } else if (fx.kind === 'open_research') {
      window.open('https://duckduckgo.com/?q=' + encodeURIComponent(fx.query), '_blank', 'noopener');
    } else if (fx.kind === 'notify') {
      toast(fx.message);
    } else if (fx.kind === 'navigate') {
      if (fx.target === 'back') {
        history.pop();
        goingBack = true;
        api('POST', '/v1/preview/messages', {type: 'preview-nav', path: history.length ? '/' + history[history.length - 1] : '/'});
      } else if (fx.target === '/') {
        history = [];
        goingBack = false;
      } else if (fx.target.charAt(0) !== '#') {
        if (!goingBack) { history.push(fx.target); }
        goingBack = false;
      }
    }
  });

  window.addEventListener('message', function(e){
    if (e.source !== frame.contentWindow || !e.data || typeof e.data !== 'object') { return; }
    if (e.data.type === 'ELEMENT_SELECTED') {
      selected = e.data;
      document.getElementById('selection').hidden = false;
      document.getElementById('selection-label').textContent = '<' + e.data.tagName + '> ' + e.data.selector;
      document.getElementById('selection-text').value = e.data.text || '';
    }
    api('POST', '/v1/preview/messages', e.data);
  });

  var pending = null;
  source.addEventListener('input', function(){
    clearTimeout(pending);
    pending = setTimeout(function(){ api('PUT', '/v1/source', {content: source.value}); }, 150);
  });
  document.getElementById('edit-mode').addEventListener('change', function(e){
    if (!e.target.checked) { selected = null; document.getElementById('selection').hidden = true; }
    api('POST', '/v1/edit-mode', {enabled: e.target.checked});
  });
  document.getElementById('selection-apply').addEventListener('click', function(){
    if (!selected) { return; }
    api('POST', '/v1/elements/update', {
      selector: selected.selector,
      patch: {text: document.getElementById('selection-text').value}
    }).then(function(r){ if (!r.ok) { toast('Could not update the element'); } });
  });
  document.getElementById('clear-pages').addEventListener('click', function(){
    api('DELETE', '/v1/pages').then(function(){ toast('Generated pages cleared'); });
  });

  fetch('/v1/source').then(function(r){ return r.json(); }).then(function(doc){ source.value = doc.content; });
})();
</script>
</body>
</html>
"##;

/// Shell page for `app_name`.
pub(crate) fn render(app_name: &str) -> String {
    SHELL_TEMPLATE
        .replace("{{APP_NAME}}", &escape_html(app_name))
        .replace("{{SANDBOX}}", SandboxPolicy::attribute())
}
