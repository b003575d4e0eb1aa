//! BDD Tests for request-body and endpoint building

use cucumber::{gherkin::Step, given, then, when, World};
use request_engine::*;
use serde_json::{Map, Value};

#[derive(Debug, World)]
#[world(init = Self::new)]
struct RequestWorld {
    template: Value,
    pristine: Value,
    body: Option<Value>,
    saved: Map<String, Value>,
    params: SplitParams,
    endpoint: Option<BuiltEndpoint>,
    error: Option<String>,
}

impl RequestWorld {
    fn new() -> Self {
        Self {
            template: Value::Object(Map::new()),
            pristine: Value::Object(Map::new()),
            body: None,
            saved: Map::new(),
            params: SplitParams::default(),
            endpoint: None,
            error: None,
        }
    }

    fn split(&self, step: &Step) -> probe_core::Result<SplitParams> {
        let table = step.table.as_ref().expect("step needs a table");
        let source = MapSource::new("scenario variables", &self.saved);
        let resolver = Resolver::new().with_source(&source);
        split_params(&table.rows, &resolver, ParamMode::Mixed)
    }
}

fn parse_doc(step: &Step) -> Value {
    let doc = step.docstring.as_ref().expect("step needs a doc string");
    serde_json::from_str(doc).expect("doc string should be JSON")
}

#[given("the request template")]
async fn given_template(world: &mut RequestWorld, step: &Step) {
    world.template = parse_doc(step);
    world.pristine = world.template.clone();
}

#[given(expr = "a saved value {string} of {int}")]
async fn given_saved_value(world: &mut RequestWorld, key: String, value: i64) {
    world.saved.insert(key, Value::from(value));
}

#[when("I apply the overrides")]
async fn when_apply_overrides(world: &mut RequestWorld, step: &Step) {
    let table = step.table.as_ref().expect("step needs a table");
    let overrides = OverrideSet::from_rows(&table.rows).expect("overrides should parse");
    world.body = Some(apply_overrides(world.template.clone(), &overrides));
}

#[when("I split the parameters")]
async fn when_split_params(world: &mut RequestWorld, step: &Step) {
    world.params = world.split(step).expect("parameters should resolve");
}

#[when("I split the parameters expecting an error")]
async fn when_split_params_fails(world: &mut RequestWorld, step: &Step) {
    world.error = world.split(step).err().map(|e| e.to_string());
}

#[when(expr = "I build the endpoint {string}")]
async fn when_build_endpoint(world: &mut RequestWorld, template: String) {
    let built = build_endpoint(&template, &world.params.path).expect("template is not empty");
    let url = add_query_params(&built.url, &world.params.query);
    world.endpoint = Some(BuiltEndpoint { url, ..built });
}

#[then("the request body should be")]
async fn then_body_is(world: &mut RequestWorld, step: &Step) {
    assert_eq!(world.body.as_ref(), Some(&parse_doc(step)));
}

#[then("the template should be unchanged")]
async fn then_template_unchanged(world: &mut RequestWorld) {
    assert_eq!(world.template, world.pristine);
}

#[then(expr = "the endpoint should be {string}")]
async fn then_endpoint_is(world: &mut RequestWorld, expected: String) {
    assert_eq!(world.endpoint.as_ref().map(|e| e.url.as_str()), Some(expected.as_str()));
}

#[then("there should be no endpoint warnings")]
async fn then_no_warnings(world: &mut RequestWorld) {
    let endpoint = world.endpoint.as_ref().expect("no endpoint built");
    assert!(endpoint.warnings.is_empty(), "warnings: {:?}", endpoint.warnings);
}

#[then(expr = "there should be an endpoint warning mentioning {string}")]
async fn then_warning_mentions(world: &mut RequestWorld, needle: String) {
    let endpoint = world.endpoint.as_ref().expect("no endpoint built");
    assert!(endpoint.warnings.iter().any(|w| w.contains(&needle)));
}

#[then(expr = "the error should be {string}")]
async fn then_error_is(world: &mut RequestWorld, expected: String) {
    assert_eq!(world.error.as_deref(), Some(expected.as_str()));
}

#[tokio::main]
async fn main() {
    RequestWorld::run("tests/features").await;
}
