use routescope::indexer::nest::NestExtractor;
use routescope::model::ParamKind;
use std::path::{Path, PathBuf};

fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("nest_app")
        .join(rel)
}

fn parse(path: &str, source: &str) -> Option<routescope::model::ControllerDescriptor> {
    let mut extractor = NestExtractor::new().unwrap();
    extractor.parse(Path::new(path), source)
}

#[test]
fn extract_fixture_controller_with_parameters() {
    let path = fixture_path("src/cats/cats.controller.ts");
    let source = std::fs::read_to_string(&path).unwrap();
    let mut extractor = NestExtractor::new().unwrap();
    let controller = extractor.parse(&path, &source).unwrap();

    assert_eq!(controller.name, "CatsController");
    assert_eq!(controller.source_file, path);
    let routes: Vec<_> = controller
        .routes
        .iter()
        .map(|r| (r.http_method.as_str(), r.full_path.as_str(), r.handler_name.as_str()))
        .collect();
    assert_eq!(
        routes,
        vec![
            ("GET", "/cats/:id", "findOne"),
            ("POST", "/cats", "create"),
            ("GET", "/cats", "findAll"),
        ]
    );

    let find_one = &controller.routes[0].parameters;
    assert_eq!(find_one.len(), 1);
    assert_eq!(find_one[0].name, "id");
    assert_eq!(find_one[0].kind, ParamKind::Path);
    assert_eq!(find_one[0].declared_type.as_deref(), Some("string"));
    assert!(!find_one[0].optional);

    let create = &controller.routes[1].parameters;
    assert_eq!(create[0].kind, ParamKind::Body);
    assert_eq!(create[0].declared_type.as_deref(), Some("CreateCatDto"));

    let find_all = &controller.routes[2].parameters;
    assert_eq!(find_all[0].name, "limit");
    assert_eq!(find_all[0].kind, ParamKind::Query);
    assert!(find_all[0].optional);
}

#[test]
fn object_argument_supplies_base_path() {
    let path = fixture_path("src/users/users.controller.ts");
    let source = std::fs::read_to_string(&path).unwrap();
    let controller = parse(path.to_str().unwrap(), &source).unwrap();
    assert_eq!(controller.base_path, "users");
    assert_eq!(
        controller.routes[0].full_path,
        "/users/:userId/posts/:postId"
    );
    assert_eq!(
        controller.routes[0].path_parameters,
        vec!["userId", "postId"]
    );
    let methods: Vec<_> = controller
        .routes
        .iter()
        .map(|r| r.http_method.as_str())
        .collect();
    assert_eq!(methods, vec!["GET", "PATCH", "DELETE"]);
}

#[test]
fn service_class_is_not_a_controller() {
    let path = fixture_path("src/cats/cats.service.ts");
    let source = std::fs::read_to_string(&path).unwrap();
    assert!(parse(path.to_str().unwrap(), &source).is_none());
}

#[test]
fn empty_controller_argument_and_bare_verbs() {
    let source = r#"
@Controller()
export class RootController {
  @Get()
  health() {}

  @Post('/login')
  login() {}

  @Put
  replace() {}
}
"#;
    let controller = parse("root.controller.ts", source).unwrap();
    assert_eq!(controller.base_path, "");
    let routes: Vec<_> = controller
        .routes
        .iter()
        .map(|r| (r.http_method.as_str(), r.full_path.as_str()))
        .collect();
    assert_eq!(
        routes,
        vec![("GET", "/"), ("POST", "/login"), ("PUT", "/")]
    );
}

#[test]
fn bare_controller_decorator_has_empty_base() {
    let source = "@Controller\nexport class BareController {\n  @Get('ping')\n  ping() {}\n}\n";
    let controller = parse("bare.controller.ts", source).unwrap();
    assert_eq!(controller.name, "BareController");
    assert_eq!(controller.base_path, "");
    assert_eq!(controller.routes[0].full_path, "/ping");
}

#[test]
fn first_verb_decorator_wins() {
    let source = r#"
@Controller('m')
export class MultiController {
  @Get('a')
  @Post('b')
  both() {}
}
"#;
    let controller = parse("multi.controller.ts", source).unwrap();
    let routes: Vec<_> = controller
        .routes
        .iter()
        .map(|r| (r.http_method.as_str(), r.full_path.as_str()))
        .collect();
    assert_eq!(routes, vec![("GET", "/m/a")]);
}

#[test]
fn quoted_path_key_and_non_literal_path() {
    let quoted = r#"
@Controller({ 'path': 'q', version: '2' })
export class QuotedController {
  @Get(':id')
  one(@Param('id') id: string) {}
}
"#;
    let controller = parse("quoted.controller.ts", quoted).unwrap();
    assert_eq!(controller.base_path, "q");
    assert_eq!(controller.routes[0].full_path, "/q/:id");

    let computed = r#"
const BASE = 'computed';

@Controller({ path: BASE })
export class ComputedController {
  @Get()
  all() {}
}
"#;
    let controller = parse("computed.controller.ts", computed).unwrap();
    assert_eq!(controller.base_path, "");
    assert_eq!(controller.routes[0].full_path, "/");
}

#[test]
fn anonymous_default_export_is_unknown_controller() {
    let source = "@Controller('anon')\nexport default class {\n  @Get('x')\n  x() {}\n}\n";
    let controller = parse("anon.controller.ts", source).unwrap();
    assert_eq!(controller.name, "UnknownController");
    assert_eq!(controller.routes.len(), 1);
    assert_eq!(controller.routes[0].full_path, "/anon/x");
    assert_eq!(controller.routes[0].owner_name, "UnknownController");
}

#[test]
fn undecorated_methods_and_unknown_decorators_are_skipped() {
    let source = r#"
@Controller('jobs')
export class JobsController {
  helper() {}

  @UseGuards(AuthGuard)
  @Get('active')
  active() {}

  @Cron('* * * * *')
  tick() {}
}
"#;
    let controller = parse("jobs.controller.ts", source).unwrap();
    assert_eq!(controller.routes.len(), 1);
    assert_eq!(controller.routes[0].full_path, "/jobs/active");
    assert_eq!(controller.routes[0].handler_name, "active");
}

#[test]
fn only_first_controller_in_file_is_used() {
    let source = r#"
@Controller('a')
export class AController {
  @Get()
  list() {}
}

@Controller('b')
export class BController {
  @Get()
  list() {}
}
"#;
    let controller = parse("two.controller.ts", source).unwrap();
    assert_eq!(controller.name, "AController");
    assert_eq!(controller.routes[0].full_path, "/a");
}

#[test]
fn syntax_errors_elsewhere_do_not_hide_routes() {
    let source = r#"
@Controller('broken')
export class BrokenController {
  @Get('ok')
  ok() {}
}

const = ;
"#;
    let controller = parse("broken.controller.ts", source).unwrap();
    assert_eq!(controller.routes[0].full_path, "/broken/ok");
}

#[test]
fn tsx_files_use_tsx_grammar() {
    let source = r#"
@Controller('pages')
export class PagesController {
  @Get()
  render() {
    return <div>hello</div>;
  }
}
"#;
    let controller = parse("pages.controller.tsx", source).unwrap();
    assert_eq!(controller.routes[0].full_path, "/pages");
}
