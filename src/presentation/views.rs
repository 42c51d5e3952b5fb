use askama::Template;

#[derive(Debug, Clone)]
pub struct NavLink {
    pub identifier: String,
    pub title: String,
}

#[derive(Template)]
#[template(
    ext = "html",
    source = r#"<nav><ul>{% for link in links %}<li><a href="/{{ link.identifier }}">{{ link.title }}</a></li>{% endfor %}</ul></nav>"#
)]
pub struct NavTemplate<'a> {
    pub links: &'a [NavLink],
}

#[derive(Template)]
#[template(ext = "html", source = r#"<p class="greeting">Hello, {{ name }}!</p>"#)]
pub struct GreetingTemplate<'a> {
    pub name: &'a str,
}

/// Full document; `nav` and `greeting` are already rendered fragments.
#[derive(Template)]
#[template(
    ext = "html",
    source = r#"<!doctype html>
<html>
<head><title>{{ title }}</title></head>
<body>
{{ nav|safe }}
<main>
<h1>{{ title }}</h1>
{% if let Some(parent) = parent %}<p class="breadcrumb"><a href="/{{ parent }}">Up</a></p>{% endif %}
{{ greeting|safe }}
<article>{{ body }}</article>
</main>
</body>
</html>
"#
)]
pub struct PageTemplate<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub parent: Option<&'a str>,
    pub nav: &'a str,
    pub greeting: &'a str,
}
