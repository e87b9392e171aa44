//! Renderers that record instead of drawing.
//!
//! Installed as the registry fallback they can stand in for any design, which
//! is how the CLI renders responses without a browser. Every instance reports
//! what it was given through `snapshot`.

use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future;
use serde_json::{Value, json};
use ulid::Ulid;

use crate::config::Config;
use crate::descriptor::{ComponentModel, DEFAULT_LAYER, Schema};
use crate::error::ViewError;
use crate::instance::{Component, Layout, RenderContext, SlotManager, SlotSet, View};
use crate::link_manager::{CurrentValue, Discriminator, FieldScope, ValueCell};
use crate::platform::{Platform, Transport};
use crate::reconcile::{self, InstanceType, ReconcileReport, Typed};
use crate::registry::{Implementation, ImplementationKind, Loader, Registry};
use crate::view_model::ViewModel;

pub const DIALOG_LAYER: &str = "dialog";
pub const TABLE: &str = "table";

/// Renders the `main` and `dialog` layers.
#[derive(Debug)]
pub struct HeadlessView {
    layers: Vec<String>,
}

impl Default for HeadlessView {
    fn default() -> Self {
        Self {
            layers: vec![DEFAULT_LAYER.to_owned(), DIALOG_LAYER.to_owned()],
        }
    }
}

impl View for HeadlessView {
    fn layers(&self) -> Vec<String> {
        self.layers.clone()
    }
}

/// Accepts every slot name.
#[derive(Debug, Default)]
pub struct HeadlessLayout {
    renders: usize,
}

impl Layout for HeadlessLayout {
    fn slots(&self) -> SlotSet {
        SlotSet::Open
    }

    fn render_layout(
        &mut self,
        models: &[Rc<ComponentModel>],
        slots: &mut SlotManager,
        context: &RenderContext,
    ) -> Result<ReconcileReport, ViewError> {
        self.renders += 1;
        slots.render_slots(models, context)
    }

    fn snapshot(&self) -> Value {
        json!({"renders": self.renders})
    }
}

/// Keeps the last model's title and data and binds its fields.
#[derive(Debug, Default)]
pub struct RecordingComponent {
    renders: usize,
    title: Option<String>,
    data: Value,
}

impl Component for RecordingComponent {
    fn render(&mut self, model: &Rc<ComponentModel>, _context: &RenderContext) -> Result<(), ViewError> {
        self.renders += 1;
        self.title = model.head().title()?.map(str::to_owned);
        self.data = model.data().clone();

        bind_parameters(model)?;
        if let Value::Object(record) = model.data() {
            for schema in model.schema()? {
                let value = record.get(schema.name()?).cloned().unwrap_or(Value::Null);
                model.bind_field(schema, value, None, FieldScope::Data)?;
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Value {
        json!({"renders": self.renders, "title": self.title, "data": self.data})
    }
}

/// One row per record, one cell per schema column.
#[derive(Debug, Default)]
pub struct HeadlessTable {
    renders: usize,
    rows: Vec<Row>,
}

#[derive(Debug)]
struct Row {
    id: Ulid,
    instance_type: InstanceType,
    renders: usize,
    cells: Vec<Cell>,
}

#[derive(Debug)]
struct Cell {
    instance_type: InstanceType,
    value: Rc<ValueCell>,
}

impl Typed for Row {
    fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }
}

impl Typed for Cell {
    fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }
}

impl Row {
    const TYPE: &'static str = "row";

    fn render(&mut self, model: &ComponentModel, columns: &[Schema], record: &Value, index: usize) -> Result<(), ViewError> {
        self.renders += 1;
        reconcile::reconcile_children(
            &mut self.cells,
            columns,
            |column| cell_type(column),
            |instance_type, _, _| {
                Ok(Cell {
                    instance_type: instance_type.clone(),
                    value: ValueCell::empty(),
                })
            },
            |cell, column, _| {
                let value = record.get(column.name()?).cloned().unwrap_or(Value::Null);
                cell.value.set(value);
                model.bind_field(
                    column,
                    Rc::clone(&cell.value),
                    Some(Discriminator::Index(index)),
                    FieldScope::Data,
                )?;
                Ok(())
            },
        )?;
        Ok(())
    }

    fn snapshot(&self) -> Value {
        let cells: Vec<Value> = self
            .cells
            .iter()
            .map(|cell| cell.value.current_value().unwrap_or(Value::Null))
            .collect();
        json!({"id": self.id.to_string(), "renders": self.renders, "cells": cells})
    }
}

fn cell_type(column: &Schema) -> Result<InstanceType, ViewError> {
    Ok(InstanceType::element(column.kind()?.unwrap_or("text")))
}

impl Component for HeadlessTable {
    fn render(&mut self, model: &Rc<ComponentModel>, _context: &RenderContext) -> Result<(), ViewError> {
        self.renders += 1;
        bind_parameters(model)?;
        let records = model.records()?;
        let columns = model.schema()?;
        let report = reconcile::reconcile_children(
            &mut self.rows,
            records,
            |_| Ok(InstanceType::element(Row::TYPE)),
            |instance_type, _, _| {
                Ok(Row {
                    id: Ulid::new(),
                    instance_type: instance_type.clone(),
                    renders: 0,
                    cells: Vec::new(),
                })
            },
            |row, record, index| row.render(model, columns, record, index),
        )?;
        log::trace!("table rows: {report:?}");
        Ok(())
    }

    fn snapshot(&self) -> Value {
        let rows: Vec<Value> = self.rows.iter().map(Row::snapshot).collect();
        json!({"renders": self.renders, "rows": rows})
    }
}

/// Binds every parameter field to the value the model carries for it.
fn bind_parameters(model: &ComponentModel) -> Result<(), ViewError> {
    for schema in model.parameter_schema()? {
        let value = model.parameter(schema.name()?)?.cloned().unwrap_or(Value::Null);
        model.bind_field(schema, value, None, FieldScope::Parameter)?;
    }
    Ok(())
}

/// Loads a headless implementation for any type: tables get
/// [`HeadlessTable`], other components [`RecordingComponent`].
pub fn loader() -> Loader {
    Rc::new(|instance_type: InstanceType, kind: ImplementationKind| {
        let implementation = match kind {
            ImplementationKind::View => Implementation::view::<HeadlessView>(),
            ImplementationKind::Layout => Implementation::layout::<HeadlessLayout>(),
            ImplementationKind::Component
                if instance_type
                    .name()
                    .is_some_and(|name| name.eq_ignore_ascii_case(TABLE)) =>
            {
                Implementation::component::<HeadlessTable>()
            }
            ImplementationKind::Component => Implementation::component::<RecordingComponent>(),
        };
        future::ready(Ok(implementation)).boxed_local()
    })
}

/// Makes the headless kit the fallback of `registry`.
pub fn install(registry: &Registry) {
    registry.set_fallback(loader());
}

/// A coordinator whose registry falls back to the headless kit.
pub fn view_model(config: Config, transport: Rc<dyn Transport>, platform: Rc<dyn Platform>) -> ViewModel {
    let registry = Rc::new(Registry::new());
    install(&registry);
    ViewModel::new(config, transport, platform, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view_model::Navigator;

    fn render_table(table: &mut HeadlessTable, raw: Value) -> Rc<ComponentModel> {
        let model = Rc::new(ComponentModel::parse(&raw).unwrap());
        let registry = Rc::new(Registry::new());
        let context = RenderContext::new(Navigator::detached(), registry, None);
        table.render(&model, &context).unwrap();
        model
    }

    fn table(records: Value) -> Value {
        json!({
            "head": {"component": "table"},
            "schema": [{"name": "id", "bind": "edit"}, {"name": "title"}],
            "data": records,
            "links": [{"name": "edit", "ref": "book"}],
        })
    }

    #[test]
    fn rows_are_bound_per_index() {
        let mut component = HeadlessTable::default();
        let model = render_table(
            &mut component,
            table(json!([{"id": 1, "title": "Dune"}, {"id": 2, "title": "Emma"}])),
        );

        let second = model.link_values("edit", Some(&Discriminator::Index(1))).unwrap();
        assert_eq!(second.data["id"], json!(2));
        assert!(!second.data.contains_key("title"));
        assert_eq!(component.snapshot()["rows"][1]["cells"], json!([2, "Emma"]));
    }

    #[test]
    fn rerendering_does_not_grow_row_links() {
        let model = Rc::new(
            ComponentModel::parse(&table(json!([{"id": 1, "title": "Dune"}, {"id": 2, "title": "Emma"}]))).unwrap(),
        );
        let context = RenderContext::new(Navigator::detached(), Rc::new(Registry::new()), None);
        let mut component = HeadlessTable::default();
        for _ in 0..3 {
            component.render(&model, &context).unwrap();
        }

        assert_eq!(model.bound_fields("edit", Some(&Discriminator::Index(0))), 1);
        assert_eq!(model.bound_fields("edit", Some(&Discriminator::Index(1))), 1);
        assert_eq!(model.link_values("edit", Some(&Discriminator::Index(1))).unwrap().data["id"], json!(2));
    }

    #[test]
    fn shrinking_table_keeps_leading_rows() {
        let mut component = HeadlessTable::default();
        render_table(
            &mut component,
            table(json!([{"id": 1, "title": "a"}, {"id": 2, "title": "b"}, {"id": 3, "title": "c"}])),
        );
        let first_row = component.snapshot()["rows"][0]["id"].clone();

        render_table(&mut component, table(json!([{"id": 3, "title": "c"}])));
        let snapshot = component.snapshot();

        assert_eq!(snapshot["rows"].as_array().map(Vec::len), Some(1));
        assert_eq!(snapshot["rows"][0]["id"], first_row);
        assert_eq!(snapshot["rows"][0]["cells"], json!([3, "c"]));
        assert_eq!(snapshot["rows"][0]["renders"], json!(2));
    }

    #[tokio::test]
    async fn loader_picks_implementation_by_name() {
        let registry = Registry::new();
        install(&registry);
        let table = InstanceType::named(Some("lcars"), "Table");
        let text = InstanceType::named(Some("lcars"), "text");
        registry.load(&table, ImplementationKind::Component).await.unwrap();
        registry.load(&text, ImplementationKind::Component).await.unwrap();

        let table = registry.create_component(&table).unwrap();
        assert_eq!(table.snapshot()["rows"], json!([]));
        let text = registry.create_component(&text).unwrap();
        assert_eq!(text.snapshot()["renders"], json!(0));
    }

    #[test]
    fn recording_component_binds_record_fields() {
        let model = Rc::new(
            ComponentModel::parse(&json!({
                "head": {"component": "form", "title": "Edit"},
                "parameterSchema": [{"name": "id", "bind": "save"}],
                "parameters": {"id": 7},
                "schema": [{"name": "title", "bind": "save"}],
                "data": {"title": "Dune"},
            }))
            .unwrap(),
        );
        let context = RenderContext::new(Navigator::detached(), Rc::new(Registry::new()), None);
        let mut component = RecordingComponent::default();
        component.render(&model, &context).unwrap();

        let values = model.link_values("save", None).unwrap();
        assert_eq!(values.parameters["id"], json!(7));
        assert_eq!(values.data["title"], json!("Dune"));
        assert_eq!(component.snapshot()["title"], json!("Edit"));
    }
}
