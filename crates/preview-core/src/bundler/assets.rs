//! Blocks injected into every bundled document. Each carries the sentinel
//! attribute so a re-bundle can strip and re-inject them exactly once.
//! None of these may contain a closing `script`/`style` tag.

pub const SENTINEL_ATTR: &str = "data-preview-capture";

pub const RESET_CSS: &str = "*,*::before,*::after{box-sizing:border-box;}\
html,body{margin:0;padding:0;}\
body{min-height:100vh;font-family:system-ui,-apple-system,'Segoe UI',Roboto,sans-serif;line-height:1.5;-webkit-font-smoothing:antialiased;}\
img,picture,video,canvas,svg{display:block;max-width:100%;}\
input,button,textarea,select{font:inherit;}\
.preview-toast{position:fixed;right:16px;bottom:16px;z-index:2147483646;max-width:320px;padding:12px 16px;border-radius:8px;background:#18181b;color:#fafafa;box-shadow:0 8px 24px rgba(0,0,0,.25);font-size:14px;}\
.preview-toast.error{background:#7f1d1d;}\
.preview-error-banner{position:fixed;left:0;right:0;top:0;z-index:2147483647;padding:10px 14px;background:#b91c1c;color:#fff;font:12px/1.4 ui-monospace,monospace;white-space:pre-wrap;}\
.preview-placeholder{max-width:640px;margin:48px auto;padding:24px;font-family:system-ui,sans-serif;color:#3f3f46;}\
.preview-placeholder code{background:#f4f4f5;padding:2px 6px;border-radius:4px;}";

/// Surfaces runtime exceptions as a visible banner instead of failing silently.
pub const ERROR_TRAP_JS: &str = r#"(function(){
  function show(msg){
    try{
      var b=document.querySelector('.preview-error-banner');
      if(!b){b=document.createElement('div');b.className='preview-error-banner';(document.body||document.documentElement).appendChild(b);}
      b.textContent='Preview error: '+msg;
    }catch(_){}
  }
  window.addEventListener('error',function(e){show(e.message||String(e.error||'unknown error'));});
  window.addEventListener('unhandledrejection',function(e){show(String(e.reason&&e.reason.message||e.reason||'unhandled rejection'));});
})();"#;

/// Interaction capture: classifies clicks and submissions, talks to the host
/// through `postMessage`, answers host commands and drives edit mode.
pub const CAPTURE_JS: &str = r#"(function(){
  if(window.__previewCapture){return;}
  window.__previewCapture=true;
  var editMode=false, selected=null;
  function post(msg){try{window.parent.postMessage(msg,'*');}catch(_){}}
  function rid(){return 'r-'+Date.now().toString(36)+'-'+Math.random().toString(36).slice(2,8);}
  function norm(s){return String(s||'').replace(/\s+/g,' ').trim().replace(/^[→←›‹»«<>↗➜\s]+|[→←›‹»«<>↗➜\s]+$/g,'');}
  function slug(s){return norm(s).toLowerCase().replace(/[^a-z0-9]+/g,'-').replace(/^-+|-+$/g,'')||'page';}
  var IGNORE=[/^(sort|sort by\b.*|filter|filters|filter by\b.*|refine|clear( all)?( filters)?|reset( filters)?)$/i,/^(close|dismiss|cancel|x|menu|toggle( menu)?)$/i,/^(next|prev|previous|first|last|page \d+|load more|show more|show less|see less|read less)$/i,/^\d+$/,/^[^A-Za-z0-9À-￿]+$/];
  var EXTERNAL=[/\b(facebook|instagram|twitter|linkedin|youtube|tiktok|pinterest|github|whatsapp)\b/i,/^(visit (our )?(website|site|store|shop)|open website|view on \w+)$/i,/^(call( us)?( now| today)?|phone( us)?|email( us)?|e-mail( us)?|send (us )?an? email)$/i];
  var FORM=[[/^(book|reserve|schedule)\b|\b(booking|reservation|appointment|consultation)\b/i,'booking.create'],[/\b(get|request)( a| an| your)?( free)? (quote|estimate)\b/i,'quote.request'],[/^(contact( us)?|get in touch|send( a| us a)? message|send|submit|enquire|inquire)( now| today)?$/i,'contact.submit'],[/\b(subscribe|sign up for (our )?newsletter|join (our )?(newsletter|mailing list))\b/i,'newsletter.subscribe'],[/\badd to (cart|bag|basket)\b/i,'cart.add']];
  var REDIRECT=[[/\b(checkout|check out|proceed to (checkout|payment)|buy now|pay now|place (your )?order|complete (your )?(purchase|order))\b/i,'checkout',1],[/(\b(view|go to|open|see) (your |my )?(cart|bag|basket)\b|^(cart|my cart|bag|basket)$)/i,'cart',.95],[/^(shop|shop now|shop all|shop the collection|browse( all)?|explore( products| collection)?|order now|start shopping|view (all )?(products|collection|menu)|see (all )?(products|collection))\b/i,'products',.95],[/^(sign ?up|register|create (an |your )?account|join( now| us| free| today)?|get started|start (your )?(free )?trial|try (it )?(for )?free)\b/i,'signup',.9],[/^(log ?in|sign ?in|my account)\b/i,'login',.9],[/(\b(see|view|compare) (our )?(plans|pricing|prices)\b|\bchoose (a |your )?plan\b)/i,'pricing',.9],[/\b(view|see|browse) (the |our )?(gallery|portfolio|work|photos)\b/i,'gallery',.85],[/\b(learn more|read more|see details|view details|more info|discover more|find out more)\b/i,'details',.85],[/\b(meet (the|our) team|our story)\b/i,'about',.8]];
  function any(list,l){for(var i=0;i<list.length;i++){if(list[i].test(l)){return true;}}return false;}
  function find(list,l){for(var i=0;i<list.length;i++){if(list[i][0].test(l)){return list[i];}}return null;}
  function classify(label,ctx){
    var l=norm(label)||String(label||'').trim();
    if(ctx.noIntent){return {category:'ignore'};}
    if(ctx.declaredIntent){return {category:'declared',intent:ctx.declaredIntent};}
    if(any(IGNORE,l)){return {category:'ignore'};}
    if(ctx.isInNav){var r=find(REDIRECT,l);return r&&r[2]>=.9?{category:'redirect',pageType:r[1]}:{category:'nav'};}
    if(any(EXTERNAL,l)){return {category:'redirect',pageType:'details'};}
    var f=find(FORM,l);if(f){return {category:'form',intent:f[1]};}
    var d=find(REDIRECT,l);if(d){return {category:'redirect',pageType:d[1]};}
    var h=ctx.href||'';
    if(/^(https?:|\/\/|mailto:|tel:)/i.test(h)){return {category:'redirect',pageType:'details'};}
    return {category:'nav'};
  }
  function formData(form){var out={};if(!form){return out;}try{new FormData(form).forEach(function(v,k){if(typeof v==='string'){out[k]=v;}});}catch(_){}return out;}
  function toast(text,isError){
    var t=document.createElement('div');t.className='preview-toast'+(isError?' error':'');t.textContent=text;
    document.body.appendChild(t);setTimeout(function(){t.remove();},3500);
  }
  function selectorFor(el){
    if(el.id){return '#'+CSS.escape(el.id);}
    var parts=[];
    while(el&&el.nodeType===1&&el!==document.body){
      var tag=el.tagName.toLowerCase(),i=1,s=el;
      while((s=s.previousElementSibling)){if(s.tagName===el.tagName){i++;}}
      parts.unshift(tag+':nth-of-type('+i+')');el=el.parentElement;
    }
    return parts.length?'body > '+parts.join(' > '):'body';
  }
  document.addEventListener('mouseover',function(e){if(editMode&&e.target!==selected){e.target.style.outline='2px dashed #6366f1';}},true);
  document.addEventListener('mouseout',function(e){if(editMode&&e.target!==selected){e.target.style.outline='';}},true);
  document.addEventListener('click',function(e){
    if(editMode){
      e.preventDefault();e.stopPropagation();
      if(selected){selected.style.outline='';}
      selected=e.target;selected.style.outline='2px solid #6366f1';
      post({type:'ELEMENT_SELECTED',selector:selectorFor(selected),tagName:selected.tagName,text:(selected.textContent||'').trim().slice(0,500),classes:Array.prototype.slice.call(selected.classList)});
      return;
    }
    var el=e.target.closest('a,button,[data-intent],[role=button],input[type=submit]');
    if(!el){return;}
    var label=el.getAttribute('aria-label')||el.textContent||el.value||'';
    var href=el.getAttribute('href');
    var ctx={tagName:el.tagName,isInNav:!!el.closest('nav,header,footer'),declaredIntent:el.getAttribute('data-intent'),noIntent:el.hasAttribute('data-no-intent'),href:href};
    var form=el.closest('form');
    if(form&&(el.type==='submit'||el.tagName==='BUTTON')&&!ctx.declaredIntent){return;}
    var c=classify(label,ctx);
    if(c.category==='ignore'){if(href&&href.charAt(0)!=='#'){e.preventDefault();}return;}
    e.preventDefault();
    if(c.category==='declared'||c.category==='form'){
      post({type:'INTENT_TRIGGER',intent:c.intent,payload:Object.assign({label:norm(label)},formData(form)),requestId:rid()});
    }else if(c.category==='redirect'){
      post({type:'NAV_PAGE_GENERATE',pageName:c.pageType==='details'?slug(label):c.pageType,pageContext:{pageType:c.pageType,label:norm(label),href:href},navLabel:norm(label),requestId:rid()});
    }else if(href&&href.charAt(0)==='#'){
      var target=href.length>1&&document.querySelector(href);if(target){target.scrollIntoView({behavior:'smooth'});}
    }else{
      post({type:'preview-nav',intent:'nav.goto',path:href||'/'+slug(label),label:norm(label)});
    }
  },true);
  document.addEventListener('submit',function(e){
    e.preventDefault();
    var form=e.target,text=((form.id||'')+' '+(form.className||'')+' '+(form.textContent||'')).toLowerCase();
    var intent=form.getAttribute('data-intent')||(/book|reserv|appointment/.test(text)?'booking.create':/newsletter|subscribe/.test(text)?'newsletter.subscribe':/quote|estimate/.test(text)?'quote.request':/contact|message/.test(text)?'contact.submit':'lead.submit');
    post({type:'INTENT_TRIGGER',intent:intent,payload:formData(form),requestId:rid()});
  },true);
  window.addEventListener('message',function(e){
    if(e.source!==window.parent){return;}
    var m=e.data||{};
    if(m.type==='INTENT_COMMAND'&&m.command==='scroll-to-booking'){
      var f=document.querySelector('form[data-intent^="booking"],#booking form,form#booking,#book form,[id*="book"] form,[class*="book"] form,form');
      if(f){f.scrollIntoView({behavior:'smooth',block:'center'});}
      post({type:'INTENT_COMMAND_RESULT',command:m.command,requestId:m.requestId,handled:!!f});
    }else if(m.type==='INTENT_RESULT'){
      toast(m.success?((m.data&&m.data.message)||'Done'):(m.error||'Something went wrong'),!m.success);
    }else if(m.type==='NAV_PAGE_ERROR'){
      toast(m.error||'Could not open that page',true);
    }else if(m.type==='SET_EDIT_MODE'){
      editMode=!!m.enabled;if(!editMode&&selected){selected.style.outline='';selected=null;}
    }else if(m.type==='UPDATE_ELEMENT'){
      var node=document.querySelector(m.selector);if(!node){return;}
      var p=m.patch||{};
      if(typeof p.text==='string'){node.textContent=p.text;}
      Object.keys(p.styles||{}).forEach(function(k){node.style.setProperty(k,p.styles[k]);});
      Object.keys(p.attributes||{}).forEach(function(k){if(!/^on/i.test(k)){node.setAttribute(k,p.attributes[k]);}});
    }
  });
})();"#;
