#![forbid(unsafe_code)]

//! End-to-end tests for the reconciliation engine.
//!
//! Organized by concern:
//! 1. `two_way` - control edits reach the model, model changes reach controls
//! 2. `conversion` - nullable and validating conversions
//! 3. `propagation` - nested members, computed members, notification order
//! 4. `streaming` - async handlers, alternation, supersede policy
//! 5. `errors` - declaration errors, handler errors and panics
//! 6. `queueing` - re-entrant inputs and runaway feedback
//! 7. `lifecycle` - toolkit adapter hook, dispose
//!
//! Run:
//!   cargo test -p rebind-runtime --test reconcile_e2e

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use common::{Counter, Game, Person, Widget};
use rebind_runtime::{
    BindError, Binding, BindingDescriptor, CancelReason, CancellationToken, ConfigError, Direction, EngineConfig,
    EnginePolicy, EventSource, EventStream, Handler, HandlerError, ModelReader, ModelSignal,
    Record, Schema, Session, SupersedePolicy, UpdateTrigger, control_part, display, model_part,
    schema, start, validate_text,
};

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Shared fixture: a person form
// =========================================================================

#[derive(Debug, Clone)]
enum Msg {
    Rename(String),
    Birthday,
    ForgetAge,
    CountTo(i32),
    Forever,
    FlakyCount,
    Fail,
    Explode,
    Touch,
}

struct Form {
    name: Widget<String>,
    nickname: Widget<String>,
    age: Widget<Option<i32>>,
    greeting: Widget<String>,
    events: EventSource<Msg>,
}

impl Form {
    fn new() -> Self {
        Self {
            name: Widget::new("name_box"),
            nickname: Widget::new("nickname_box"),
            age: Widget::new("age_spin"),
            greeting: Widget::new("greeting_label"),
            events: EventSource::new("form"),
        }
    }
}

fn person_bindings(form: &Form, _: &Person) -> Result<Vec<Binding<Person>>, BindError> {
    Ok(vec![
        Binding::from_parts(
            control_part(form.name.clone()).named("name_box"),
            model_part::<Person, String>("name")?,
            Direction::TwoWay(None),
        )?,
        Binding::from_parts(
            control_part(form.nickname.clone()).named("nickname_box"),
            model_part::<Person, Option<String>>("nickname")?,
            Direction::TwoWay(None),
        )?,
        Binding::from_parts(
            control_part(form.age.clone()).named("age_spin"),
            model_part::<Person, Option<i32>>("age")?,
            Direction::TwoWay(Some(UpdateTrigger::OnChange)),
        )?,
        Binding::one_way(
            control_part(form.greeting.clone()).named("greeting_label"),
            model_part::<Person, String>("greeting")?,
        ),
    ])
}

fn form_events(form: &Form) -> Vec<EventStream<Msg>> {
    vec![form.events.stream()]
}

fn explode() -> Person {
    panic!("kaboom")
}

fn dispatch(msg: Msg) -> Handler<Person> {
    match msg {
        Msg::Rename(name) => Handler::update(move |p: &Person| Person { name, ..p.clone() }),
        Msg::Birthday => Handler::update(|p: &Person| Person {
            age: p.age.map(|a| a + 1),
            ..p.clone()
        }),
        Msg::ForgetAge => Handler::update(|p: &Person| Person {
            age: None,
            ..p.clone()
        }),
        Msg::CountTo(n) => Handler::stream(move |p: Person| {
            (1..=n).map(move |i| Person {
                age: Some(i),
                ..p.clone()
            })
        }),
        Msg::Forever => Handler::stream(|p: Person| {
            (100..).map(move |i| Person {
                age: Some(i),
                ..p.clone()
            })
        }),
        Msg::FlakyCount => Handler::try_stream(|p: Person| {
            vec![
                Ok(Person {
                    age: Some(1),
                    ..p.clone()
                }),
                Err("sensor offline"),
            ]
        }),
        Msg::Fail => Handler::try_update(|_: &Person| Err::<Person, _>("quota exceeded")),
        Msg::Explode => Handler::update(|_: &Person| explode()),
        Msg::Touch => Handler::update(|p: &Person| Person {
            edits: p.edits + 1,
            ..p.clone()
        }),
    }
}

fn launch(form: &Form, config: EngineConfig) -> (ModelSignal<Person>, Session<Person, Msg>) {
    start(
        person_bindings,
        form_events,
        dispatch,
        form,
        Person::dan(),
        config,
    )
    .unwrap()
}

fn collect_errors() -> (EngineConfig, Rc<RefCell<Vec<String>>>) {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    let config =
        EngineConfig::default().on_error(move |e: &HandlerError| sink.borrow_mut().push(e.to_string()));
    (config, errors)
}

fn pump_until<M: Record, E: 'static>(session: &Session<M, E>, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        session.pump();
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

// =========================================================================
// 1. Two-way bindings
// =========================================================================

mod two_way {
    use super::*;

    #[test]
    fn initial_model_is_pushed_to_controls() {
        let form = Form::new();
        let (signal, _session) = launch(&form, EngineConfig::default());
        assert_eq!(form.name.value(), "Dan");
        assert_eq!(form.age.value(), Some(30));
        assert_eq!(form.nickname.value(), "");
        assert_eq!(form.greeting.value(), "Hello Dan");
        assert_eq!(signal.version(), 0);
    }

    #[test]
    fn edit_reaches_model_on_validation() {
        let form = Form::new();
        let (signal, session) = launch(&form, EngineConfig::default());

        form.name.edit("Bob".into());
        assert_eq!(signal.current().name, "Dan", "text box commits on validation");

        form.name.commit();
        assert_eq!(signal.current().name, "Bob");
        assert_eq!(signal.version(), 1);
        assert_eq!(session.stats().view_changes, 1);
    }

    #[test]
    fn model_change_updates_control_without_raising_view_change() {
        let form = Form::new();
        let (signal, session) = launch(&form, EngineConfig::default());

        form.events.emit(Msg::Rename("Eve".into()));
        assert_eq!(form.name.value(), "Eve");
        assert_eq!(signal.current().name, "Eve");

        let stats = session.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.view_changes, 0);
        assert_eq!(stats.commits, 1);
    }

    #[test]
    fn on_change_control_echo_is_suppressed() {
        let form = Form::new();
        let (signal, session) = launch(&form, EngineConfig::default());

        // The age widget raises its native change event on programmatic
        // writes, and is bound OnChange.
        form.events.emit(Msg::Birthday);
        assert_eq!(form.age.value(), Some(31));
        assert_eq!(signal.current().age, Some(31));
        assert_eq!(session.stats().view_changes, 0);
    }

    #[test]
    fn originating_control_is_not_written_back() {
        let form = Form::new();
        let (_signal, session) = launch(&form, EngineConfig::default());
        form.name.clear_writes();
        form.greeting.clear_writes();

        form.name.enter("Bob".into());
        assert!(form.name.writes().is_empty());
        assert_eq!(form.greeting.writes(), vec!["Hello Bob".to_string()]);
        assert_eq!(session.stats().bindings_notified, 1);
    }

    #[test]
    fn unchanged_value_commits_nothing() {
        let form = Form::new();
        let (signal, session) = launch(&form, EngineConfig::default());
        form.events.emit(Msg::Rename("Dan".into()));
        assert_eq!(signal.version(), 0);
        assert_eq!(session.stats().commits, 0);
    }
}

// =========================================================================
// 2. Conversion
// =========================================================================

mod conversion {
    use super::*;

    #[test]
    fn none_renders_as_null_and_back() {
        let form = Form::new();
        let (signal, _session) = launch(&form, EngineConfig::default());

        form.events.emit(Msg::ForgetAge);
        assert_eq!(form.age.value(), None);

        form.age.edit(Some(41));
        assert_eq!(signal.current().age, Some(41));

        form.age.edit(None);
        assert_eq!(signal.current().age, None);
    }

    #[test]
    fn blank_text_is_none() {
        let form = Form::new();
        let (signal, _session) = launch(&form, EngineConfig::default());

        form.nickname.enter("Danny".into());
        assert_eq!(signal.current().nickname.as_deref(), Some("Danny"));

        form.nickname.enter("   ".into());
        assert_eq!(signal.current().nickname, None);
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Signup {
        email: Result<String, String>,
    }

    impl Record for Signup {
        fn schema() -> Schema<Self> {
            schema!(Signup {
                email,
                computed valid = |s: &Signup| s.email.is_ok(),
            })
        }
    }

    struct SignupForm {
        email: Widget<String>,
        valid: Widget<bool>,
    }

    #[test]
    fn validation_errors_flow_through_the_model() {
        let view = SignupForm {
            email: Widget::new("email_box"),
            valid: Widget::new("valid_icon"),
        };
        let reported: Rc<RefCell<Vec<Option<String>>>> = Rc::default();
        let sink = Rc::clone(&reported);
        let (signal, _session) = start(
            move |v: &SignupForm, _: &Signup| -> Result<Vec<Binding<Signup>>, BindError> {
                let report = move |e: Option<&str>| sink.borrow_mut().push(e.map(str::to_owned));
                Ok(vec![
                    Binding::validated(
                        control_part(v.email.clone()),
                        model_part::<Signup, Result<String, String>>("email")?,
                        validate_text(|t| {
                            if t.contains('@') {
                                Ok(())
                            } else {
                                Err("missing @".into())
                            }
                        }),
                        Direction::TwoWay(None),
                        report,
                    )?,
                    Binding::one_way(control_part(v.valid.clone()), model_part::<Signup, bool>("valid")?),
                ])
            },
            |_: &SignupForm| Vec::<EventStream<()>>::new(),
            |(): ()| Handler::<Signup>::ignore(),
            &view,
            Signup {
                email: Ok("a@b.c".into()),
            },
            EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(view.email.value(), "a@b.c");
        assert!(view.valid.value());

        view.email.enter("nope".into());
        assert_eq!(signal.current().email, Err("missing @".to_string()));
        assert!(!view.valid.value());
        assert_eq!(view.email.value(), "nope", "rejected text stays in the control");
        assert_eq!(reported.borrow().last(), Some(&Some("missing @".to_string())));

        view.email.enter("x@y.z".into());
        assert_eq!(signal.current().email, Ok("x@y.z".to_string()));
        assert!(view.valid.value());
        assert_eq!(reported.borrow().last(), Some(&None));
    }
}

// =========================================================================
// 3. Propagation
// =========================================================================

mod propagation {
    use super::*;

    #[test]
    fn computed_member_follows_its_inputs() {
        let form = Form::new();
        let (_signal, _session) = launch(&form, EngineConfig::default());

        form.name.enter("Bob".into());
        assert_eq!(form.greeting.value(), "Hello Bob");

        form.events.emit(Msg::Rename("Eve".into()));
        assert_eq!(form.greeting.value(), "Hello Eve");
    }

    #[test]
    fn unrelated_controls_are_not_written() {
        let form = Form::new();
        let (_signal, _session) = launch(&form, EngineConfig::default());
        form.age.clear_writes();
        form.nickname.clear_writes();

        form.events.emit(Msg::Rename("Eve".into()));
        assert!(form.age.writes().is_empty());
        assert!(form.nickname.writes().is_empty());
    }

    #[test]
    fn bindings_are_notified_in_declaration_order() {
        let form = Form::new();
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();
        let recorder = Rc::clone(&log);
        let (_signal, _session) = start(
            move |_: &Form, _: &Person| -> Result<Vec<Binding<Person>>, BindError> {
                let mut bindings = Vec::new();
                for (tag, member) in [("A", "name"), ("B", "name"), ("D", "age"), ("C", "name")] {
                    let log = Rc::clone(&recorder);
                    let effect = move || log.borrow_mut().push(tag);
                    bindings.push(if member == "name" {
                        Binding::callback(model_part::<Person, String>(member)?, move |_| effect())
                    } else {
                        Binding::callback(model_part::<Person, Option<i32>>(member)?, move |_| {
                            effect();
                        })
                    });
                }
                Ok(bindings)
            },
            form_events,
            dispatch,
            &form,
            Person::dan(),
            EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(*log.borrow(), ["A", "B", "D", "C"], "initial push");

        for name in ["Eve", "Fay", "Gus"] {
            log.borrow_mut().clear();
            form.events.emit(Msg::Rename(name.into()));
            assert_eq!(*log.borrow(), ["A", "B", "C"]);
        }
    }

    struct Board {
        home: Widget<String>,
        away: Widget<String>,
        total: Widget<String>,
        goals: EventSource<&'static str>,
    }

    #[test]
    fn nested_change_touches_only_its_branch() {
        let board = Board {
            home: Widget::new("home_score"),
            away: Widget::new("away_score"),
            total: Widget::new("total"),
            goals: EventSource::new("goals"),
        };
        let (signal, session) = start(
            |b: &Board, _: &Game| -> Result<Vec<Binding<Game>>, BindError> {
                Ok(vec![
                    Binding::one_way_with(
                        control_part(b.home.clone()),
                        model_part::<Game, u32>("home.score")?,
                        display(),
                    ),
                    Binding::one_way_with(
                        control_part(b.away.clone()),
                        model_part::<Game, u32>("away.score")?,
                        display(),
                    ),
                    Binding::one_way_with(
                        control_part(b.total.clone()),
                        model_part::<Game, u32>("total")?,
                        display(),
                    ),
                ])
            },
            |b: &Board| vec![b.goals.stream()],
            |_side: &'static str| {
                Handler::update(|g: &Game| {
                    let mut next = g.clone();
                    next.home.score = 9;
                    next
                })
            },
            &board,
            Game::level(),
            EngineConfig::default(),
        )
        .unwrap();

        board.goals.emit("home");
        assert_eq!(board.home.value(), "9");
        assert_eq!(board.total.value(), "10");
        assert_eq!(board.away.writes(), vec!["1".to_string()], "only the initial push");
        assert_eq!(signal.current().away, Game::level().away);
        assert_eq!(session.stats().bindings_notified, 2);
    }
}

// =========================================================================
// 4. Streaming
// =========================================================================

mod streaming {
    use super::*;

    #[test]
    fn each_yield_is_one_commit_in_order() {
        let form = Form::new();
        let (signal, session) = launch(&form, EngineConfig::default());
        let commits: Rc<RefCell<Vec<Option<i32>>>> = Rc::default();
        let c = Rc::clone(&commits);
        let _watch = signal.subscribe(move |p: &Person| c.borrow_mut().push(p.age));
        form.age.clear_writes();

        form.events.emit(Msg::CountTo(3));
        assert_eq!(session.in_flight(), 1);
        assert!(session.pump_until_idle(WAIT));

        assert_eq!(*commits.borrow(), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(form.age.writes(), vec![Some(1), Some(2), Some(3)]);
        let stats = session.stats();
        assert_eq!(stats.async_started, 1);
        assert_eq!(stats.async_yields, 3);
        assert_eq!(stats.commits, 3);
        assert_eq!(session.in_flight(), 0);
    }

    #[test]
    fn worker_resumes_only_after_commit() {
        let form = Form::new();
        let reader: Arc<OnceLock<ModelReader<Person>>> = Arc::default();
        let observed: Arc<Mutex<Vec<Option<i32>>>> = Arc::default();
        let (r, o) = (Arc::clone(&reader), Arc::clone(&observed));
        let (signal, session) = start(
            person_bindings,
            form_events,
            move |msg: Msg| match msg {
                Msg::CountTo(n) => {
                    let (reader, observed) = (Arc::clone(&r), Arc::clone(&o));
                    Handler::stream(move |p: Person| {
                        (1..=n).map(move |i| {
                            if let Some(reader) = reader.get() {
                                observed.lock().unwrap().push(reader.current().age);
                            }
                            Person {
                                age: Some(i),
                                ..p.clone()
                            }
                        })
                    })
                }
                other => dispatch(other),
            },
            &form,
            Person::dan(),
            EngineConfig::default(),
        )
        .unwrap();
        reader.set(signal.reader()).unwrap();

        form.events.emit(Msg::CountTo(3));
        assert!(session.pump_until_idle(WAIT));
        assert_eq!(*observed.lock().unwrap(), vec![Some(30), Some(1), Some(2)]);
    }

    #[test]
    fn stream_error_stops_after_committed_items() {
        let form = Form::new();
        let (config, errors) = collect_errors();
        let (signal, session) = launch(&form, config);

        form.events.emit(Msg::FlakyCount);
        assert!(session.pump_until_idle(WAIT));
        assert_eq!(signal.current().age, Some(1));
        assert_eq!(*errors.borrow(), ["handler failed: sensor offline"]);
        assert_eq!(session.stats().handler_errors, 1);
    }

    #[test]
    fn run_to_completion_lets_both_finish() {
        let form = Form::new();
        let (signal, session) = launch(&form, EngineConfig::default());

        form.events.emit(Msg::CountTo(2));
        form.events.emit(Msg::CountTo(2));
        assert_eq!(session.in_flight(), 2);
        assert!(session.pump_until_idle(WAIT));

        let stats = session.stats();
        assert_eq!(stats.async_started, 2);
        assert_eq!(stats.async_yields, 4);
        assert_eq!(stats.async_cancelled, 0);
        assert_eq!(signal.current().age, Some(2));
    }

    #[test]
    fn cancel_previous_drops_superseded_items() {
        let form = Form::new();
        let config = EngineConfig::default().supersede(SupersedePolicy::CancelPrevious);
        let (signal, session) = launch(&form, config);

        form.events.emit(Msg::Forever);
        assert!(pump_until(&session, || signal.current().age == Some(100)));

        let ages: Rc<RefCell<Vec<Option<i32>>>> = Rc::default();
        let a = Rc::clone(&ages);
        let _watch = signal.subscribe(move |p: &Person| a.borrow_mut().push(p.age));

        form.events.emit(Msg::CountTo(3));
        assert_eq!(session.stats().async_cancelled, 1);
        assert_eq!(session.in_flight(), 1);
        assert!(session.pump_until_idle(WAIT));

        assert_eq!(*ages.borrow(), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(signal.current().age, Some(3));
    }

    #[test]
    fn policy_struct_selects_supersede() {
        let policy = EnginePolicy {
            supersede: SupersedePolicy::CancelPrevious,
            worker_name_prefix: "form-async".into(),
            ..EnginePolicy::default()
        };
        let form = Form::new();
        let (_signal, session) = launch(&form, EngineConfig::default().with_policy(policy));
        form.events.emit(Msg::Forever);
        form.events.emit(Msg::Forever);
        assert_eq!(session.in_flight(), 1);
        assert_eq!(session.stats().async_cancelled, 1);
    }
}

// =========================================================================
// 5. Errors
// =========================================================================

mod errors {
    use super::*;

    #[test]
    fn handler_error_goes_to_hook_and_model_is_kept() {
        let form = Form::new();
        let (config, errors) = collect_errors();
        let (signal, session) = launch(&form, config);

        form.events.emit(Msg::Fail);
        assert_eq!(*errors.borrow(), ["handler failed: quota exceeded"]);
        assert_eq!(signal.current(), Person::dan());
        assert_eq!(session.stats().handler_errors, 1);

        // The engine keeps working afterwards.
        form.events.emit(Msg::Rename("Eve".into()));
        assert_eq!(form.name.value(), "Eve");
    }

    #[test]
    fn handler_panic_is_routed() {
        let form = Form::new();
        let (config, errors) = collect_errors();
        let (_signal, session) = launch(&form, config);

        form.events.emit(Msg::Explode);
        assert_eq!(*errors.borrow(), ["handler panicked: kaboom"]);
        assert_eq!(session.state(), rebind_runtime::EngineState::Idle);
    }

    #[test]
    #[should_panic(expected = "unhandled handler error")]
    fn handler_error_without_hook_panics() {
        let form = Form::new();
        let (_signal, _session) = launch(&form, EngineConfig::default());
        form.events.emit(Msg::Fail);
    }

    #[test]
    fn computed_target_cannot_be_two_way() {
        let form = Form::new();
        let result = start(
            |f: &Form, _: &Person| -> Result<Vec<Binding<Person>>, BindError> {
                Ok(vec![Binding::from_parts(
                    control_part(f.greeting.clone()),
                    model_part::<Person, String>("greeting")?,
                    Direction::TwoWay(None),
                )?])
            },
            form_events,
            dispatch,
            &form,
            Person::dan(),
            EngineConfig::default(),
        );
        assert!(matches!(result, Err(BindError::ReadOnlyTarget { .. })));
    }

    #[test]
    fn bad_path_fails_at_start() {
        let form = Form::new();
        let result = start(
            |f: &Form, _: &Person| -> Result<Vec<Binding<Person>>, BindError> {
                Ok(vec![Binding::one_way(
                    control_part(f.greeting.clone()),
                    model_part::<Person, String>("name.len()")?,
                )])
            },
            form_events,
            dispatch,
            &form,
            Person::dan(),
            EngineConfig::default(),
        );
        assert!(matches!(result, Err(BindError::Path(_))));
        assert_eq!(form.events.emit(Msg::Touch), 0, "nothing was wired");
    }

    #[test]
    fn invalid_policy_fails_at_start() {
        let form = Form::new();
        let config = EngineConfig::default().with_policy(EnginePolicy {
            max_queue_depth: 0,
            ..EnginePolicy::default()
        });
        let result = start(
            person_bindings,
            form_events,
            dispatch,
            &form,
            Person::dan(),
            config,
        );
        let Err(BindError::Policy(ConfigError::Validation(problems))) = result else {
            panic!("expected a policy error");
        };
        assert_eq!(problems, ["max_queue_depth must be > 0"]);
        assert!(form.name.writes().is_empty(), "no initial push");
        assert_eq!(form.events.emit(Msg::Touch), 0, "nothing was wired");
    }

    /// `notes` is a real field the schema leaves out.
    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        title: String,
        notes: String,
    }

    impl Record for Doc {
        fn schema() -> Schema<Self> {
            schema!(Doc { title })
        }
    }

    struct DocForm {
        title: Widget<String>,
        edits: EventSource<&'static str>,
    }

    #[test]
    fn change_outside_schema_is_not_committed() {
        let form = DocForm {
            title: Widget::new("title_box"),
            edits: EventSource::new("doc"),
        };
        let (config, errors) = collect_errors();
        let original = Doc {
            title: "orig".into(),
            notes: "orig".into(),
        };
        let (signal, session) = start(
            |f: &DocForm, _: &Doc| -> Result<Vec<Binding<Doc>>, BindError> {
                Ok(vec![Binding::one_way(
                    control_part(f.title.clone()),
                    model_part::<Doc, String>("title")?,
                )])
            },
            |f: &DocForm| vec![f.edits.stream()],
            |notes: &'static str| {
                Handler::update(move |_: &Doc| Doc {
                    title: "new".into(),
                    notes: notes.into(),
                })
            },
            &form,
            original.clone(),
            config,
        )
        .unwrap();

        form.edits.emit("kept?");
        assert_eq!(errors.borrow().len(), 1);
        assert!(
            errors.borrow()[0].contains("changed a member its schema does not declare"),
            "{:?}",
            errors.borrow()
        );
        assert_eq!(signal.current(), original);
        assert_eq!(form.title.value(), "orig");
        assert_eq!(session.stats().commits, 0);
    }
}

// =========================================================================
// 6. Queueing
// =========================================================================

mod queueing {
    use super::*;

    fn touching_bindings(
        form: &Form,
        model: &Person,
        touches: usize,
    ) -> Result<Vec<Binding<Person>>, BindError> {
        let mut bindings = person_bindings(form, model)?;
        let events = form.events.clone();
        bindings.push(Binding::callback(
            model_part::<Person, String>("name")?,
            move |_| {
                for _ in 0..touches {
                    events.emit(Msg::Touch);
                }
            },
        ));
        Ok(bindings)
    }

    #[test]
    fn input_raised_during_commit_runs_after_it() {
        let form = Form::new();
        let (signal, session) = start(
            |f: &Form, m: &Person| touching_bindings(f, m, 1),
            form_events,
            dispatch,
            &form,
            Person::dan(),
            EngineConfig::default(),
        )
        .unwrap();
        let seen: Rc<RefCell<Vec<(String, u32)>>> = Rc::default();
        let s = Rc::clone(&seen);
        let _watch = signal.subscribe(move |p: &Person| s.borrow_mut().push((p.name.clone(), p.edits)));

        form.name.enter("Bob".into());
        assert_eq!(
            *seen.borrow(),
            vec![("Bob".to_string(), 0), ("Bob".to_string(), 1)]
        );
        let stats = session.stats();
        assert_eq!(stats.view_changes, 1);
        assert_eq!(stats.events, 1);
        assert_eq!(session.state(), rebind_runtime::EngineState::Idle);
    }

    #[test]
    #[should_panic(expected = "exceeded 1 waiting inputs")]
    fn runaway_queue_panics() {
        let form = Form::new();
        let config = EngineConfig::default().with_policy(EnginePolicy {
            max_queue_depth: 1,
            ..EnginePolicy::default()
        });
        let (_signal, _session) = start(
            |f: &Form, m: &Person| touching_bindings(f, m, 2),
            form_events,
            dispatch,
            &form,
            Person::dan(),
            config,
        )
        .unwrap();
        form.name.enter("Bob".into());
    }
}

// =========================================================================
// 7. Lifecycle
// =========================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn adapter_sees_every_binding_once() {
        let form = Form::new();
        let wired: Rc<RefCell<Vec<BindingDescriptor>>> = Rc::default();
        let w = Rc::clone(&wired);
        let config =
            EngineConfig::default().with_adapter(move |d: &BindingDescriptor| w.borrow_mut().push(d.clone()));
        let (_signal, session) = launch(&form, config);

        let wired = wired.borrow();
        assert_eq!(wired.len(), 4);
        assert_eq!(wired[0].trigger, Some(UpdateTrigger::OnValidation));
        assert_eq!(wired[2].trigger, Some(UpdateTrigger::OnChange));
        assert_eq!(wired[3].direction, Direction::ToView);
        assert!(!wired[3].observes_view);
        assert_eq!(*wired, session.descriptors());
    }

    #[test]
    fn dispose_cancels_in_flight_handlers() {
        let form = Form::new();
        let token: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
        let slot = Arc::clone(&token);
        let (_signal, session) = start(
            person_bindings,
            form_events,
            move |_: Msg| {
                let slot = Arc::clone(&slot);
                Handler::cancellable(move |p: Person, token: CancellationToken| {
                    *slot.lock().unwrap() = Some(token);
                    std::iter::repeat(p)
                })
            },
            &form,
            Person::dan(),
            EngineConfig::default(),
        )
        .unwrap();

        form.events.emit(Msg::Forever);
        assert!(pump_until(&session, || token.lock().unwrap().is_some()));
        session.dispose();

        let token = token.lock().unwrap().clone().unwrap();
        assert_eq!(token.reason(), Some(CancelReason::Disposed));
        assert!(token.task().is_some());
    }

    #[test]
    fn dropped_session_stops_listening() {
        let form = Form::new();
        let hits = Counter::default();
        let (signal, session) = launch(&form, EngineConfig::default());
        let h = hits.clone();
        let _watch = signal.subscribe(move |_| h.hit());

        drop(session);
        assert_eq!(form.events.emit(Msg::Rename("Eve".into())), 0);
        form.name.enter("Bob".into());
        assert_eq!(hits.get(), 0);
        assert_eq!(signal.current(), Person::dan());
    }
}
