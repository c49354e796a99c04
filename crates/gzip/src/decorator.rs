/// Turns a handler into another one, wrapping it with extra behavior.
pub trait Decorator<In> {
    type Out;

    fn decorate(&self, raw: In) -> Self::Out;
}
